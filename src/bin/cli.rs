//! EWS CLI
//!
//! Command-line interface for EWS operations:
//! - Post or publish readings
//! - Browse history and summaries
//! - Check server status
//! - Generate a config file

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use ews::api::dto::{HealthResponse, ReadingListResponse};
use ews::ingest::mqtt::{parse_broker_address, qos_from_level};
use ews::reading::{Reading, SensorPayload, StoredReading};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ews-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Weather station telemetry tool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8080", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a reading through the HTTP API
    Post(ReadingArgs),

    /// Publish a reading on the sensor bus, as a station would
    Publish {
        #[command(flatten)]
        reading: ReadingArgs,
        /// Broker address
        #[arg(long, default_value = "tcp://localhost:1883")]
        broker: String,
        /// Sensor topic
        #[arg(long, default_value = "ews/sensor")]
        topic: String,
        /// Delivery guarantee (0, 1, 2)
        #[arg(long, default_value = "0")]
        qos: u8,
    },

    /// Show the most recent reading
    Latest,

    /// List readings
    History {
        /// Time range (e.g., 6h, 1d, 7d)
        #[arg(short, long, default_value = "1d")]
        last: String,
        /// Maximum readings to list
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Summary statistics over a time range
    Summary {
        /// Time range (e.g., 6h, 1d, 7d)
        #[arg(short, long, default_value = "1d")]
        last: String,
    },

    /// Show server status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Reading values; unspecified sensors default to zero
#[derive(Args)]
pub struct ReadingArgs {
    /// Capture time: "now", RFC 3339 or Unix milliseconds
    #[arg(long)]
    time: Option<String>,
    #[arg(long)]
    temperature: f64,
    #[arg(long)]
    humidity: f64,
    #[arg(long, default_value = "0")]
    pressure: f64,
    #[arg(long, default_value = "0")]
    altitude: f64,
    #[arg(long, default_value = "0")]
    co2: f64,
    #[arg(long, default_value = "0")]
    distance: f64,
    #[arg(long, default_value = "0")]
    wind_speed: f64,
    #[arg(long, default_value = "0")]
    wind_direction: f64,
    #[arg(long, default_value = "0")]
    rainfall: f64,
    #[arg(long, default_value = "0")]
    voltage: f64,
    #[arg(long, default_value = "0")]
    bus_voltage: f64,
    #[arg(long, default_value = "0")]
    current: f64,
}

impl ReadingArgs {
    fn into_reading(self) -> anyhow::Result<Reading> {
        Ok(Reading {
            timestamp: parse_time(self.time.as_deref())?,
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            altitude: self.altitude,
            co2: self.co2,
            distance: self.distance,
            wind_speed: self.wind_speed,
            wind_direction: self.wind_direction,
            rainfall: self.rainfall,
            voltage: self.voltage,
            bus_voltage: self.bus_voltage,
            current: self.current,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let json = cli.format == "json";

    match cli.command {
        Commands::Post(args) => {
            let reading = args.into_reading()?;

            let response = client
                .post(format!("{}/api/v1/readings", cli.api_url))
                .json(&reading)
                .send()
                .await
                .with_context(|| format!("cannot reach EWS API at {}", cli.api_url))?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                bail!("post failed ({}): {}", status, text);
            }

            let stored: StoredReading = response.json().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stored)?);
            } else {
                println!(
                    "Stored reading {} at {}",
                    stored.id,
                    stored.reading.timestamp.format("%Y-%m-%dT%H:%M:%SZ")
                );
            }
        }

        Commands::Publish {
            reading,
            broker,
            topic,
            qos,
        } => {
            let reading = reading.into_reading()?;
            let payload = serde_json::to_vec(&SensorPayload::from_reading(&reading))?;
            publish(&broker, &topic, qos, payload).await?;
            println!("Published reading to {} on {}", topic, broker);
        }

        Commands::Latest => {
            let response = client
                .get(format!("{}/api/v1/readings/latest", cli.api_url))
                .send()
                .await?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                println!("No readings stored yet.");
                return Ok(());
            }
            if !response.status().is_success() {
                bail!("failed to fetch latest reading: {}", response.status());
            }

            let latest: StoredReading = response.json().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&latest)?);
            } else {
                print_table(std::slice::from_ref(&latest));
            }
        }

        Commands::History { last, limit } => {
            let end = Utc::now();
            let start = end - parse_duration(&last)?;

            let response = client
                .get(format!("{}/api/v1/readings", cli.api_url))
                .query(&[
                    ("start", start.to_rfc3339()),
                    ("end", end.to_rfc3339()),
                    ("limit", limit.to_string()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                bail!("history query failed ({}): {}", status, text);
            }

            let list: ReadingListResponse = response.json().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&list.readings)?);
            } else if list.readings.is_empty() {
                println!("No readings in the last {}", last);
            } else {
                print_table(&list.readings);
            }
        }

        Commands::Summary { last } => {
            let end = Utc::now();
            let start = end - parse_duration(&last)?;

            let response = client
                .get(format!("{}/api/v1/readings/summary", cli.api_url))
                .query(&[("start", start.to_rfc3339()), ("end", end.to_rfc3339())])
                .send()
                .await?;

            if !response.status().is_success() {
                bail!("summary query failed: {}", response.status());
            }

            let summary: serde_json::Value = response.json().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary, &last);
            }
        }

        Commands::Status => {
            let response = client
                .get(format!("{}/health", cli.api_url))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: HealthResponse = resp.json().await?;

                    println!("EWS v{}", health.version);
                    println!();
                    println!("API Status:  {}", health.status);
                    println!("Store:       {}", health.store);
                    println!("Sensor bus:  {}", health.bus);
                    println!("Subscribers: {}", health.subscribers);
                    println!();
                    println!("Uptime: {}", format_duration(health.uptime_seconds));
                }
                Ok(resp) => bail!("API returned error: {}", resp.status()),
                Err(e) => {
                    eprintln!("Cannot connect to EWS API at {}", cli.api_url);
                    eprintln!();
                    eprintln!("Make sure the EWS server is running:");
                    eprintln!("  cargo run --bin ews");
                    return Err(e.into());
                }
            }
        }

        Commands::Config { output } => {
            let config = ews::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Publish one payload and disconnect
async fn publish(broker: &str, topic: &str, qos: u8, payload: Vec<u8>) -> anyhow::Result<()> {
    let (host, port) = parse_broker_address(broker)?;
    let qos = qos_from_level(qos)?;

    let client_id = format!("ews-cli-{}", uuid::Uuid::new_v4().simple());
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(std::time::Duration::from_secs(5));

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    client.publish(topic, qos, false, payload).await?;
    client.disconnect().await?;

    // Requests only go out while the event loop is polled
    loop {
        let event = tokio::time::timeout(std::time::Duration::from_secs(10), eventloop.poll())
            .await
            .context("timed out talking to broker")??;

        if let Event::Outgoing(Outgoing::Disconnect) = event {
            return Ok(());
        }
    }
}

fn parse_time(time: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match time {
        None | Some("now") => Ok(Utc::now()),
        Some(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                Ok(dt.with_timezone(&Utc))
            } else if let Ok(ms) = s.parse::<i64>() {
                DateTime::from_timestamp_millis(ms)
                    .with_context(|| format!("timestamp out of range: {}", ms))
            } else {
                bail!("Invalid timestamp format: {}", s)
            }
        }
    }
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        Ok(Duration::hours(hours.parse()?))
    } else if let Some(days) = s.strip_suffix('d') {
        Ok(Duration::days(days.parse()?))
    } else if let Some(weeks) = s.strip_suffix('w') {
        Ok(Duration::weeks(weeks.parse()?))
    } else {
        bail!("Invalid duration format: {}. Use: 6h, 1d, 2w", s)
    }
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

fn print_table(readings: &[StoredReading]) {
    println!(
        "{:<20} | {:>6} | {:>6} | {:>7} | {:>6} | {:>6} | {:>5}",
        "Time (UTC)", "Temp", "Hum", "Press", "CO2", "Wind", "Rain"
    );
    println!("{}", "-".repeat(75));

    for stored in readings {
        let r = &stored.reading;
        println!(
            "{:<20} | {:>6.1} | {:>6.1} | {:>7.1} | {:>6.0} | {:>6.1} | {:>5.1}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.temperature,
            r.humidity,
            r.pressure,
            r.co2,
            r.wind_speed,
            r.rainfall
        );
    }
}

fn print_summary(summary: &serde_json::Value, last: &str) {
    let count = summary["count"].as_u64().unwrap_or(0);
    println!("Last {}: {} readings", last, count);
    if count == 0 {
        return;
    }

    let field = |name: &str| {
        summary[name]
            .as_f64()
            .map(|v| format!("{:.1}", v))
            .unwrap_or_else(|| "-".to_string())
    };

    println!();
    println!(
        "Temperature: min {}  max {}  avg {}",
        field("minTemp"),
        field("maxTemp"),
        field("avgTemp")
    );
    println!(
        "Humidity:    min {}  max {}  avg {}",
        field("minHum"),
        field("maxHum"),
        field("avgHum")
    );
    if let Some(hour) = summary["peakHour"].as_u64() {
        println!("Warmest hour: {:02}:00 UTC (avg {})", hour, field("peakHourAvg"));
    }
    if summary["prevPeriodDiff"].is_number() {
        println!("Change vs previous period: {}", field("prevPeriodDiff"));
    }
}
