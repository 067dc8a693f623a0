use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use slpd::client::{describe_error_code, SlpClient};
use slpd_core::config::DEFAULT_RPC_PORT;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Command-line client for the SLP daemon's control port
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon control address
    #[arg(short, long, default_value_t = SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_RPC_PORT)))]
    address: SocketAddr,

    /// Seconds to wait for a reply
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the URLs registered for a service type
    Find {
        /// Service type, e.g. service:printer
        service_type: String,

        /// Scopes to search
        #[arg(short, long = "scope", default_value = "default")]
        scopes: Vec<String>,
    },

    /// Register a service URL
    Register {
        /// Service type, e.g. service:printer
        service_type: String,

        /// Service URL, e.g. service:printer://10.0.0.5
        url: String,

        /// Lifetime in seconds
        #[arg(short, long, default_value_t = 300)]
        lifetime: u32,

        /// Scopes to register in
        #[arg(short, long = "scope", default_value = "default")]
        scopes: Vec<String>,
    },

    /// Deregister a service URL
    Deregister {
        /// Service URL
        url: String,

        /// Scopes to deregister from
        #[arg(short, long = "scope", default_value = "default")]
        scopes: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut client = SlpClient::connect(args.address)
        .with_context(|| format!("Failed to connect to {}", args.address))?;
    client.set_timeout(Some(Duration::from_secs(args.timeout)))?;

    match args.command {
        Command::Find {
            service_type,
            scopes,
        } => {
            let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
            let entries = client
                .find_service(&scopes, &service_type)
                .context("FindService failed")?;
            for entry in entries {
                println!("{}", entry);
            }
        }
        Command::Register {
            service_type,
            url,
            lifetime,
            scopes,
        } => {
            let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
            let code = client
                .register_service(&scopes, &service_type, &url, lifetime)
                .context("RegisterService failed")?;
            if code != 0 {
                bail!("registration rejected: {}", describe_error_code(code));
            }
            println!("registered {}", url);
        }
        Command::Deregister { url, scopes } => {
            let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
            let code = client
                .deregister_service(&scopes, &url)
                .context("DeRegisterService failed")?;
            if code != 0 {
                bail!("deregistration rejected: {}", describe_error_code(code));
            }
            println!("deregistered {}", url);
        }
    }

    Ok(())
}
