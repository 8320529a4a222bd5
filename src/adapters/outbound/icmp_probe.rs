//! ICMP Echo Probe
//!
//! Sends one echo request and waits for a matching echo reply. In
//! privileged mode raw sockets are used; otherwise datagram ICMP sockets,
//! which Linux allows unprivileged processes to open when the pid falls
//! inside `net.ipv4.ping_group_range`.
//!
//! Socket I/O is blocking with a read deadline and runs on the blocking
//! pool, so a probe never stalls the DNS path and never outlives its
//! timeout by much.

use crate::domain::ports::HealthProbe;
use async_trait::async_trait;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

const ECHO_REQUEST_V4: u8 = 8;
const ECHO_REPLY_V4: u8 = 0;
const ECHO_REQUEST_V6: u8 = 128;
const ECHO_REPLY_V6: u8 = 129;

#[derive(Debug, Clone, Default)]
pub struct IcmpProbeParams {
    pub privileged: bool,
    pub timeout: Option<Duration>,
}

pub struct IcmpProbe {
    privileged: bool,
    timeout: Duration,
}

impl IcmpProbe {
    pub fn new(params: IcmpProbeParams) -> Self {
        if params.privileged {
            tracing::warn!("icmp probe in privileged mode requires raw-socket capability");
        }
        Self {
            privileged: params.privileged,
            timeout: params.timeout.unwrap_or(DEFAULT_TIMEOUT),
        }
    }
}

#[async_trait]
impl HealthProbe for IcmpProbe {
    async fn check(&self, endpoint: &str) -> bool {
        let Ok(ip) = endpoint.parse::<IpAddr>() else {
            return false;
        };
        // the textual scan decides the family, not the parsed address
        let v4 = is_ipv4_text(endpoint);
        let privileged = self.privileged;
        let timeout = self.timeout;

        let verdict =
            tokio::task::spawn_blocking(move || ping_once(ip, v4, privileged, timeout)).await;

        match verdict {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!("icmp probe of {endpoint} failed: {e}");
                false
            }
            Err(e) => {
                tracing::debug!("icmp probe task for {endpoint} failed: {e}");
                false
            }
        }
    }
}

/// IP family of a textual address: the first `.` means v4, the first `:`
/// means v6. Mixed notations resolve by whichever comes first.
fn is_ipv4_text(addr: &str) -> bool {
    for b in addr.bytes() {
        match b {
            b'.' => return true,
            b':' => return false,
            _ => {}
        }
    }
    false
}

fn ping_once(ip: IpAddr, v4: bool, privileged: bool, timeout: Duration) -> anyhow::Result<()> {
    let domain = if v4 { Domain::IPV4 } else { Domain::IPV6 };
    let protocol = if v4 {
        Protocol::ICMPV4
    } else {
        Protocol::ICMPV6
    };
    let kind = if privileged { Type::RAW } else { Type::DGRAM };

    let socket = Socket::new(domain, kind, Some(protocol))?;
    socket.set_read_timeout(Some(timeout))?;

    let packet = echo_request(v4);
    let target = SockAddr::from(SocketAddr::new(ip, 0));
    socket.send_to(&packet, &target)?;

    let mut buf = [MaybeUninit::<u8>::uninit(); 1500];
    let (len, _peer) = socket.recv_from(&mut buf)?;
    let datagram: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr().cast(), len) };

    let reply = strip_ip_header(datagram, v4, privileged)?;
    let expected = if v4 { ECHO_REPLY_V4 } else { ECHO_REPLY_V6 };
    if reply.first() == Some(&expected) {
        Ok(())
    } else {
        anyhow::bail!(
            "unexpected icmp reply type {:?}, want echo reply",
            reply.first()
        )
    }
}

/// Echo request with identifier pid & 0xffff and sequence 1, no payload.
/// The IPv6 checksum is left zero for the kernel to fill in.
fn echo_request(v4: bool) -> [u8; 8] {
    let id = (std::process::id() & 0xffff) as u16;
    let mut packet = [0u8; 8];
    packet[0] = if v4 { ECHO_REQUEST_V4 } else { ECHO_REQUEST_V6 };
    packet[4..6].copy_from_slice(&id.to_be_bytes());
    packet[6..8].copy_from_slice(&1u16.to_be_bytes());

    if v4 {
        let sum = internet_checksum(&packet);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());
    }
    packet
}

/// Raw IPv4 sockets deliver the IP header in front of the ICMP message;
/// datagram sockets and IPv6 do not.
fn strip_ip_header(datagram: &[u8], v4: bool, privileged: bool) -> anyhow::Result<&[u8]> {
    if v4 && privileged {
        let ihl = (datagram.first().copied().unwrap_or(0) & 0x0f) as usize * 4;
        if ihl < 20 || datagram.len() <= ihl {
            anyhow::bail!("short icmp reply: {} bytes", datagram.len());
        }
        Ok(&datagram[ihl..])
    } else if datagram.is_empty() {
        anyhow::bail!("empty icmp reply")
    } else {
        Ok(datagram)
    }
}

fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum = 0u32;
    for chunk in data.chunks(2) {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        sum = sum.wrapping_add(word as u32);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
