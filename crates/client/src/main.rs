//! wschat - terminal chat client
//!
//! Lines typed on stdin are sent as chat messages. `/reconnect` retries a
//! dropped connection and `/quit` exits.

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::time::Duration;

    use clap::Parser;
    use wschat_client::ClientConfig;

    #[derive(Parser, Debug)]
    #[command(name = "wschat", version, about = "Terminal client for a WebSocket chat room")]
    pub struct Args {
        /// Origin of the chat server, e.g. http://localhost:6088 (overrides WSCHAT_ORIGIN)
        #[arg(long)]
        pub origin: Option<String>,

        /// Reconnect attempts before giving up
        #[arg(long)]
        pub retries: Option<u32>,

        /// Base reconnect delay in milliseconds; attempt n waits n times this
        #[arg(long)]
        pub backoff_ms: Option<u64>,

        /// Show sent messages before the server confirms them
        #[arg(long)]
        pub echo: bool,

        /// Neither restore nor save the session on disk
        #[arg(long)]
        pub no_persist: bool,
    }

    impl Args {
        pub fn apply(&self, config: &mut ClientConfig) {
            if let Some(origin) = &self.origin {
                config.origin = origin.clone();
            }
            if let Some(retries) = self.retries {
                config.reconnect.max_attempts = retries;
            }
            if let Some(ms) = self.backoff_ms {
                config.reconnect.base_delay = Duration::from_millis(ms);
            }
            if self.echo {
                config.optimistic_echo = true;
            }
            if self.no_persist {
                config.persist = false;
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use clap::Parser;
    use futures_util::StreamExt;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tracing_subscriber::EnvFilter;
    use wschat_client::render::{format_message, format_notice, format_status, status_hint};
    use wschat_client::storage::FileStore;
    use wschat_client::ws::spawn_chat;
    use wschat_client::{ChatClient, ChatEvent, ClientConfig, SessionPersistence, StoreChange};

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wschat_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let mut config = ClientConfig::from_env();
    args.apply(&mut config);

    let persistence = if config.persist {
        let store = FileStore::in_config_dir();
        if store.is_none() {
            tracing::warn!("No config directory available; the session will not be saved");
        }
        store.map(|store| {
            SessionPersistence::new(
                Box::new(store),
                config.storage_key.clone(),
                config.max_persisted_messages,
            )
        })
    } else {
        None
    };

    let client = ChatClient::new(&config, persistence).context("invalid configuration")?;
    println!("Connecting to {}", client.connection().endpoint());

    let (handle, mut events, task) = spawn_chat(client, config.connect_timeout);

    let input = handle.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let sent = match line.trim() {
                "/quit" => break,
                "/reconnect" => input.reconnect(),
                _ => input.send_message(line),
            };
            if sent.is_err() {
                return;
            }
        }
        let _ = input.shutdown();
    });

    while let Some(event) = events.next().await {
        match event {
            ChatEvent::Status(state) => {
                println!("{}", format_status(state));
                if let Some(hint) = status_hint(state) {
                    println!("{hint}");
                }
            }
            ChatEvent::IdentityAssigned(id) => println!("Joined as {id}"),
            ChatEvent::Messages { change, log } => match change {
                StoreChange::Inserted { index } | StoreChange::Replaced { index } => {
                    if let Some(view) = log.get(index) {
                        println!("{}", format_message(&view.message, view.own));
                    }
                }
                StoreChange::Merged { .. } | StoreChange::Reset { .. } => {
                    println!("--- {} messages ---", log.len());
                    for view in &log {
                        println!("{}", format_message(&view.message, view.own));
                    }
                }
                StoreChange::Unchanged => {}
            },
            ChatEvent::NoticeShown(notice) => eprintln!("{}", format_notice(&notice)),
            ChatEvent::NoticeDismissed(_) => {}
        }
    }

    let client = task.await.context("chat task panicked")?;
    tracing::debug!("Exited with {} messages in the log", client.store().len());
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
