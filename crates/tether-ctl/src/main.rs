//! tether-ctl — command-line interface for the tether relay daemon.

mod cmd;

use anyhow::{Context, Result};

use cmd::channels::{cmd_channel_close, cmd_channel_show, cmd_channels};
use cmd::status::{cmd_shutdown, cmd_status};

const DEFAULT_PORT: u16 = 9081;

fn print_usage() {
    println!("Usage: tether-ctl [--port <api_port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                 Relay status (default)");
    println!("  channels               List control channels and their sessions");
    println!("  channels show <id>     Show one control channel");
    println!("  channels close <id>    Close a control channel and all its sessions");
    println!("  shutdown               Stop the daemon");
    println!("  help                   Show this message");
}

/// Split `--port <n>` out of the argument list.
fn parse_args(args: &[String]) -> Result<(u16, Vec<&str>)> {
    let mut port = DEFAULT_PORT;
    let mut remaining = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(args[i].as_str());
        }
        i += 1;
    }
    Ok((port, remaining))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (port, remaining) = parse_args(&args)?;

    match remaining.as_slice() {
        ["status"] | []                => cmd_status(port).await,
        ["channels"]                   => cmd_channels(port).await,
        ["channels", "show", id]       => cmd_channel_show(port, id).await,
        ["channels", "close", id]      => cmd_channel_close(port, id).await,
        ["shutdown"]                   => cmd_shutdown(port).await,
        ["help"] | ["--help"] | ["-h"] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
