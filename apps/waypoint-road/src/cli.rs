use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use waypoint_core::{FieldName, FieldUpdate, SessionCode, SessionFields, Station};
use waypoint_sync::{LocalCache, SyncAgent, SyncEvent, WaypointClient};

#[derive(Parser, Debug)]
#[command(name = "waypoint-road")]
#[command(about = "Waypoint session server and debug client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the session server (default when no command is given)
    Serve {
        /// Port to listen on; overrides WAYPOINT_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print a fresh session code for a host
    NewCode,

    /// Inspect or poke a session on a running server
    Debug {
        /// Server base URL
        #[arg(short, long, env = "WAYPOINT_URL", default_value = "http://localhost:8080")]
        url: String,

        /// Session code to operate on
        #[arg(short, long)]
        session: String,

        #[command(subcommand)]
        command: DebugCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum DebugCommands {
    /// Print the raw session record as JSON
    Get,

    /// Write one field; VALUE is parsed as JSON and falls back to a plain string
    Set { key: String, value: String },

    /// Poll the session like a device would and print every merged change
    Watch {
        #[arg(long, default_value_t = 3000)]
        interval_ms: u64,
    },

    /// Host view: station progress, hint unlocks and unrecognised fields
    Status,

    /// Let the player in (sets `started`)
    Activate,

    /// Close the session to new players (clears `started`)
    Deactivate,

    /// Reveal hints for a station: 1, 2, 4 or final
    Unlock { station: Station },

    /// Confirm a host-checked answer: s3_heat, s3_pressure, s3_excess or
    /// reveal_question_verified
    Verify { field: String },
}

/// Fields only the host confirms, after checking the player's answer in person.
const HOST_VERIFIED_FIELDS: &[FieldName] = &[
    FieldName::S3Heat,
    FieldName::S3Pressure,
    FieldName::S3Excess,
    FieldName::RevealQuestionVerified,
];

pub async fn run_debug_client(url: String, session: String, command: DebugCommands) -> Result<()> {
    let session = SessionCode::parse(&session).context("invalid session code")?;
    let client = WaypointClient::new(url);

    match command {
        DebugCommands::Get => {
            let fields = client.fetch_session(&session).await?;
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        DebugCommands::Set { key, value } => {
            let value = parse_value(&value);
            client.post_progress(&session, &key, &value).await?;
            println!("{session}.{key} = {value}");
        }
        DebugCommands::Watch { interval_ms } => {
            watch(client, session, Duration::from_millis(interval_ms)).await?;
        }
        DebugCommands::Status => {
            let fields = client.fetch_session(&session).await?;
            print!("{}", render_status(&session, &fields));
        }
        action @ (DebugCommands::Activate
        | DebugCommands::Deactivate
        | DebugCommands::Unlock { .. }
        | DebugCommands::Verify { .. }) => {
            let update = host_action(&session, &action)?;
            client.push(&update).await?;
            let (key, value) = update.to_request_parts();
            println!("{session}.{key} = {value}");
        }
    }
    Ok(())
}

/// The single write a host panel action performs.
fn host_action(session: &SessionCode, action: &DebugCommands) -> Result<FieldUpdate> {
    let (name, value) = match action {
        DebugCommands::Activate => (FieldName::Started, true),
        DebugCommands::Deactivate => (FieldName::Started, false),
        DebugCommands::Unlock { station } => {
            let hint = station
                .hint_field()
                .with_context(|| format!("{station} has no hints to unlock"))?;
            (hint, true)
        }
        DebugCommands::Verify { field } => {
            let name = FieldName::from(field.trim());
            if !HOST_VERIFIED_FIELDS.contains(&name) {
                bail!("{field} is not confirmed by the host");
            }
            (name, true)
        }
        other => bail!("{other:?} does not write a field"),
    };
    Ok(FieldUpdate::field(session.clone(), name, value))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn watch(client: WaypointClient, session: SessionCode, interval: Duration) -> Result<()> {
    let cache = LocalCache::new();
    let mut events = cache.subscribe();
    let handle = SyncAgent::spawn(Arc::new(client), cache.clone(), session, interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SyncEvent::Merged { session, changed }) => {
                    let fields = cache.fields().await;
                    for name in changed {
                        let value = fields.get(&name).map(|v| v.to_json()).unwrap_or(Value::Null);
                        println!("{session}.{name} = {value}");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    eprintln!("skipped {skipped} updates");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    handle.stop().await;
    Ok(())
}

fn render_status(session: &SessionCode, fields: &SessionFields) -> String {
    let mut out = format!("session {session}\n");
    let active = if fields.flag(&FieldName::Started) {
        "active"
    } else {
        "inactive"
    };
    out.push_str(&format!("  status: {active}\n"));
    if let Some(player) = fields.text(&FieldName::PlayerName) {
        out.push_str(&format!("  player: {player}\n"));
    }

    for station in Station::ALL {
        let progress = station.progress(fields);
        let mark = if progress.is_complete() { "x" } else { " " };
        let hints = match station.hint_field() {
            Some(_) if progress.hints_unlocked => ", hints unlocked",
            _ => "",
        };
        out.push_str(&format!(
            "  [{mark}] {station}: {}/{}{hints}\n",
            progress.done, progress.required
        ));
    }

    let tokens: Vec<&str> = [FieldName::Token1, FieldName::Token2, FieldName::Token3]
        .iter()
        .filter_map(|name| fields.text(name))
        .filter(|token| !token.is_empty())
        .collect();
    if !tokens.is_empty() {
        out.push_str(&format!("  tokens: {}\n", tokens.join(" ")));
    }

    let mut unknown = fields.unknown_fields().peekable();
    if unknown.peek().is_some() {
        out.push_str("  other fields:\n");
        for (name, value) in unknown {
            out.push_str(&format!("    {name} = {}\n", value.to_json()));
        }
    }
    out
}
