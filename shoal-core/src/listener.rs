use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener},
};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

/// Builds the bound TCP listening socket.
///
/// The port arrives as a single configuration string and is validated
/// here. Binding prefers a dual-stack IPv6 socket (`IPV6_V6ONLY` off) so
/// one listener serves v4 and v6 peers, falling back to plain IPv4 where
/// the v6 stack is unavailable. Address reuse is always enabled.
#[derive(Debug, Clone)]
pub struct ListenerBuilder {
    port: u16,
    backlog: u32,
}

impl ListenerBuilder {
    pub fn from_port_str(port: &str, backlog: u32) -> io::Result<Self> {
        let port = port.trim().parse::<u16>().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid listen port {port:?}"),
            )
        })?;
        Ok(Self { port, backlog })
    }

    pub fn build(&self) -> io::Result<TcpListener> {
        match self.bind(Domain::IPV6) {
            Ok(listener) => Ok(listener),
            Err(e) => {
                debug!(error = %e, "dual-stack bind failed, falling back to IPv4");
                self.bind(Domain::IPV4)
            }
        }
    }

    fn bind(&self, domain: Domain) -> io::Result<TcpListener> {
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        let addr: SocketAddr = if domain == Domain::IPV6 {
            socket.set_only_v6(false)?;
            (Ipv6Addr::UNSPECIFIED, self.port).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, self.port).into()
        };
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(self.backlog as i32)?;
        Ok(socket.into())
    }
}
