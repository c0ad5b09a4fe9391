//! Minimal REPL: join one channel, mirror it to stdout, send stdin lines.
//!
//! Usage: skiff-repl [server] [channel] [nick]
use skiff::{Config, Connection, Error};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let server = args.next().unwrap_or_else(|| "irc.libera.chat".into());
    let channel_name = args.next().unwrap_or_else(|| "#skiff".into());
    let nick = args.next().unwrap_or_else(|| "skiff-demo".into());

    let conn = Connection::connect(Config::new(&nick, &server)).await?;
    let channel = conn.join(&channel_name).await?;
    info!(%server, channel = %channel_name, "joined — type to talk, ^D to quit");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = channel.read_line() => match line {
                Ok(line) => println!("{line}"),
                Err(Error::EndOfStream) => {
                    info!("connection closed");
                    break;
                }
                Err(e) => {
                    eprintln!("connection lost: {e}");
                    break;
                }
            },
            input = stdin.next_line() => match input? {
                Some(text) if !text.trim().is_empty() => channel.write(&text)?,
                Some(_) => {}
                None => {
                    channel.part().await;
                    conn.quit()?;
                    break;
                }
            },
        }
    }

    Ok(())
}
