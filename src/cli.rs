use crate::buffer::encode_name;
use crate::types::{DnsError, Type};
use clap::Parser;
use std::ffi::OsString;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "dns-client")]
#[command(version)]
#[command(about = "Send one DNS query over UDP and print the decoded answer")]
pub struct Cli {
    /// Seconds to wait for a reply before retransmitting
    #[arg(short = 't', long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Maximum number of attempts before giving up
    #[arg(short = 'r', long = "max-retries", default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_retries: u32,

    /// UDP port of the DNS server
    #[arg(short = 'p', long, default_value_t = 53)]
    pub port: u16,

    /// Ask for mail exchange records
    #[arg(long, conflicts_with = "ns")]
    pub mx: bool,

    /// Ask for name server records
    #[arg(long)]
    pub ns: bool,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// IPv4 or IPv6 address of the DNS server, optionally prefixed with '@'
    pub server: String,

    /// Domain name to look up
    pub name: String,
}

impl Cli {
    pub fn query_type(&self) -> Type {
        if self.mx {
            Type::MX
        } else if self.ns {
            Type::NS
        } else {
            Type::A
        }
    }
}

/// Rewrites the single-dash `-mx` / `-ns` spellings into their long forms.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator,
    I::Item: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| match arg.to_str() {
            Some("-mx") => OsString::from("--mx"),
            Some("-ns") => OsString::from("--ns"),
            _ => arg,
        })
        .collect()
}

/// Validated settings for one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server:      SocketAddr,
    pub timeout:     Duration,
    pub max_retries: u32,
    pub query_type:  Type,
    pub name:        String,
}

impl ClientConfig {
    /// # Errors
    /// `DnsError::Argument` for an unparsable server, a malformed domain, or a
    /// zero timeout/retry budget. No network I/O happens before this passes.
    pub fn from_cli(cli: &Cli) -> Result<Self, DnsError> {
        let host = cli.server.strip_prefix('@').unwrap_or(&cli.server);
        let ip: IpAddr = host
            .parse()
            .map_err(|_| DnsError::Argument(format!("server `{}` is not an IP address", cli.server)))?;

        if cli.timeout == 0 {
            return Err(DnsError::Argument("timeout must be positive".into()));
        }
        if cli.max_retries == 0 {
            return Err(DnsError::Argument("max retries must be positive".into()));
        }
        encode_name(&cli.name)?;

        Ok(ClientConfig {
            server: SocketAddr::new(ip, cli.port),
            timeout: Duration::from_secs(cli.timeout),
            max_retries: cli.max_retries,
            query_type: cli.query_type(),
            name: cli.name.strip_suffix('.').unwrap_or(&cli.name).to_string(),
        })
    }
}
