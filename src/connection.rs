use crate::client::Config;
use crate::error::{Result, VbanError};
use crate::protocol::{RegisterPacket, Snapshot};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{timeout_at, Instant};

/// Receive buffer; RT packets are 1412 bytes
const RECV_BUFFER_SIZE: usize = 2048;

/// The three UDP sockets of one session
///
/// Register and command traffic each get their own socket so neither waits
/// behind the other or behind snapshot reads on the response socket.
pub struct Connection {
    host: String,
    port: u16,
    register: UdpSocket,
    request: UdpSocket,
    response: UdpSocket,
    register_packet: Mutex<RegisterPacket>,
}

impl Connection {
    /// Bind the response socket to the configured local port and open the
    /// two outbound sockets on ephemeral ports
    pub async fn bind(config: &Config) -> Result<Self> {
        let local_port = config.local_port.unwrap_or(config.port);
        let response = UdpSocket::bind((config.bind_address.as_str(), local_port)).await?;
        let register = UdpSocket::bind(("0.0.0.0", 0)).await?;
        let request = UdpSocket::bind(("0.0.0.0", 0)).await?;

        tracing::info!(
            "Listening for RT packets on {}, remote {}:{}",
            response.local_addr()?,
            config.ip,
            config.port
        );

        Ok(Self {
            host: config.ip.clone(),
            port: config.port,
            register,
            request,
            response,
            register_packet: Mutex::new(RegisterPacket::new()),
        })
    }

    /// Address the response socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.response.local_addr()?)
    }

    /// Resolve the remote host, preferring IPv4 since the outbound sockets are IPv4
    pub async fn resolve(&self) -> Result<SocketAddr> {
        let addrs: Vec<SocketAddr> = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                VbanError::Connection(format!("unable to resolve hostname {}: {}", self.host, e))
            })?
            .collect();

        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| VbanError::Connection(format!("unable to resolve hostname {}", self.host)))
    }

    /// Send one register packet and advance its frame counter
    pub async fn send_register(&self) -> Result<()> {
        let target = self.resolve().await?;
        let packet = self.register_packet.lock().next_packet();
        self.register.send_to(&packet, target).await?;
        tracing::trace!("Sent register packet to {}", target);
        Ok(())
    }

    /// Send an encoded text request
    pub async fn send_text(&self, packet: &[u8]) -> Result<()> {
        let target = self.resolve().await?;
        self.request.send_to(packet, target).await?;
        Ok(())
    }

    /// Wait for the next valid RT packet.
    ///
    /// Datagrams that fail validation are dropped and the wait continues;
    /// only running out of `timeout` is an error.
    pub async fn recv_snapshot(&self, timeout: Duration) -> Result<Snapshot> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            let (len, from) = match timeout_at(deadline, self.response.recv_from(&mut buf)).await {
                Ok(Ok(received)) => received,
                // ICMP port unreachable surfaces here on some platforms
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => continue,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(VbanError::Connection(format!(
                        "timeout waiting for RT packet from {}",
                        self.host
                    )))
                }
            };

            match Snapshot::decode(&buf[..len]) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => tracing::trace!("Discarding datagram from {}: {}", from, e),
            }
        }
    }
}
