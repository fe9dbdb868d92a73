use std::io::{self, Write};

use anyhow::Context;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::warn;

use parley_client::session;
use parley_client::{ClientCommand, ClientConfig, ClientEvent, Sent};
use parley_proto::{
    DecodeError, FileStore, FrameReader, FrameWriter, TransferOutcome, spawn_stdin_lines,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Diagnostics go to stderr; stdout is the chat transcript.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_client=warn,parley_proto=warn".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;
    let store = FileStore::new(&config.download_dir).await?;

    let addr = config.server_addr();
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("Unable to connect to server at {}", addr))?;
    stream.set_nodelay(true)?;

    let (read_half, write_half) = stream.into_split();
    let mut reader =
        FrameReader::new(read_half, config.mode).with_read_timeout(config.read_timeout);
    let mut writer = FrameWriter::new(write_half, config.mode);

    // --- Handshake ---
    let mut lines = spawn_stdin_lines();
    let prompt = session::read_prompt(&mut reader)
        .await
        .context("Error during initial communication")?;
    print!("{}", prompt);
    io::stdout().flush()?;
    let input = lines.recv().await.unwrap_or_default();
    session::send_name(&mut writer, &input)
        .await
        .context("Error during initial communication")?;

    println!(
        "Connected to chat server at {}. You can start sending messages.",
        addr
    );
    println!("Type '/file <filepath>' to send a file or '/exit' to exit.");

    let (events_tx, mut events) = mpsc::channel(64);
    tokio::spawn(session::receive_loop(reader, store, events_tx));

    show_prompt();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if !show_event(event) {
                    break;
                }
                show_prompt();
            }
            line = lines.recv() => {
                let Some(line) = line else {
                    println!("\nExiting chat...");
                    let _ = session::dispatch(&mut writer, ClientCommand::Exit).await;
                    break;
                };
                let command = match ClientCommand::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => {
                        show_prompt();
                        continue;
                    }
                    Err(e) => {
                        println!("{}", e);
                        show_prompt();
                        continue;
                    }
                };
                match session::dispatch(&mut writer, command).await {
                    Ok(Sent::Chat) => {}
                    Ok(Sent::File { name, .. }) => println!("File '{}' sent successfully.", name),
                    Ok(Sent::Closed) => {
                        println!("Exiting chat...");
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => println!("File does not exist."),
                    Err(e) if e.kind() == io::ErrorKind::InvalidInput => println!("Cannot send: {}", e),
                    Err(e) => {
                        println!("Error sending message: {}", e);
                        break;
                    }
                }
                show_prompt();
            }
        }
    }

    Ok(())
}

fn show_prompt() {
    print!("<You> ");
    let _ = io::stdout().flush();
}

/// Print one receive-side event. Returns false once the connection is gone.
fn show_event(event: ClientEvent) -> bool {
    match event {
        ClientEvent::Chat(text) => println!("\n{}", text),
        ClientEvent::File(TransferOutcome::Complete(stored)) => println!(
            "\nReceived file '{}' ({} bytes), saved to {}",
            stored.name,
            stored.size,
            stored.path.display()
        ),
        ClientEvent::File(TransferOutcome::Truncated { stored, expected }) => println!(
            "\nIncomplete file '{}': got {} of {} bytes",
            stored.name, stored.size, expected
        ),
        ClientEvent::Discarded(DecodeError::UnknownHeader(_)) => {
            println!("\nUnknown message type received.")
        }
        ClientEvent::Discarded(e) => println!("\nDiscarded malformed message: {}", e),
        ClientEvent::Disconnected(cause) => {
            if let Some(cause) = cause {
                warn!("Connection lost: {}", cause);
            }
            println!("\nDisconnected from server.");
            return false;
        }
    }
    true
}
