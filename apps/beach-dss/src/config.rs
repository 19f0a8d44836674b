use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_QUEUE: usize = 64;

#[derive(Parser, Debug, Clone)]
#[command(name = "beach-dss")]
#[command(about = "Polled signaling relay: peers POST messages for each other and GET their own")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "BEACH_DSS_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "BEACH_DSS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Messages kept per peer before the oldest is dropped
    #[arg(long, env = "BEACH_DSS_MAX_QUEUE", default_value_t = DEFAULT_MAX_QUEUE)]
    pub max_queue: usize,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from(["beach-dss", "--port", "4100", "--max-queue", "2"])
            .expect("parse");
        assert_eq!(config.port, 4100);
        assert_eq!(config.max_queue, 2);
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:4100");
    }
}
