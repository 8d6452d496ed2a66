use anyhow::Context;
use clap::Parser;
use dns_client::cli::{normalize_args, Cli, ClientConfig};
use dns_client::logging::init_logging;
use dns_client::{dns, present, resolve, DnsError, UdpTransport};
use std::io::Write;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    init_logging(cli.log_level.as_deref());

    let mut out = std::io::stdout();

    let config = match ClientConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            writeln!(out, "{}", present::error_line(&e)).context("can't write to stdout")?;
            std::process::exit(1);
        }
    };

    let mut source = dns::entropy();
    let resolution = resolve(&config, UdpTransport, &mut source).await;

    for line in present::report(&config, &resolution) {
        writeln!(out, "{line}").context("can't write report to stdout")?;
    }

    // NOTFOUND is an answer, not a failure.
    if let Err(e) = &resolution.outcome {
        if *e != DnsError::NameNotFound {
            out.flush().context("can't flush stdout")?;
            std::process::exit(1);
        }
    }
    Ok(())
}
