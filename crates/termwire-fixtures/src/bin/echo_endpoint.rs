//! Stand-alone echo endpoint for manual runs:
//! `termwire-echo-endpoint --port 9231`, then `termwire run --scenario ...`.

#![allow(clippy::print_stdout)] // Fixture reports its address on stdout

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "termwire-echo-endpoint", about = "Echo every binary message back as one frame")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 9231)]
    port: u16,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    println!("listening on ws://{}", listener.local_addr()?);

    loop {
        let (stream, _peer) = listener.accept().await?;
        tokio::spawn(async move {
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Binary(bytes) = message {
                    if ws.send(Message::Binary(bytes)).await.is_err() {
                        break;
                    }
                }
            }
        });
    }
}
