use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Registers as an app user and prints pushed nudges", long_about = None)]
struct Args {
    /// WebSocket endpoint of the nudge server
    #[clap(short, long, default_value = "ws://127.0.0.1:9003/ws")]
    url: String,

    /// User id to register as
    #[clap(short = 'i', long, default_value = "demo-user")]
    user_id: String,

    /// Keep-alive ping interval in seconds
    #[clap(short, long, default_value_t = 30)]
    ping_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("Connecting to {}...", args.url);
    let (ws_stream, _) = connect_async(args.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    let (mut write, mut read) = ws_stream.split();

    let register = json!({ "type": "register", "userId": args.user_id }).to_string();
    write.send(Message::Text(register.into())).await.context("Failed to send register")?;
    println!("Registered as '{}'. Press Ctrl+C to stop.", args.user_id);

    let mut received: BTreeMap<String, usize> = BTreeMap::new();
    let mut pinger = interval(Duration::from_secs(args.ping_seconds.max(1)));
    pinger.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = pinger.tick() => {
                let ping = json!({ "type": "ping" }).to_string();
                if write.send(Message::Text(ping.into())).await.is_err() {
                    println!("Connection lost while pinging.");
                    break;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<Frame>(&text) {
                        Ok(frame) if frame.event == "nudge" => {
                            let rule = frame.payload["ruleId"].as_str().unwrap_or("?").to_string();
                            println!(
                                "[{}] {} ({}): {}",
                                Local::now().format("%H:%M:%S"),
                                rule,
                                frame.payload["frequency"].as_str().unwrap_or("?"),
                                frame.payload["message"].as_str().unwrap_or("")
                            );
                            *received.entry(rule).or_default() += 1;
                        }
                        Ok(frame) if frame.event == "pong" => {}
                        Ok(frame) => println!("<- {} {}", frame.event, frame.payload),
                        Err(_) => println!("<- (unparsed) {}", text),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        println!("Server closed the connection.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        println!("Read error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    println!("\n----- Nudges received -----");
    if received.is_empty() {
        println!("None");
    }
    for (rule, count) in &received {
        println!("{}: {}", rule, count);
    }
    println!("---------------------------");
    Ok(())
}
