use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use futures::TryStreamExt;
use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_route::RouteNetlinkMessage;
use netlink_packet_route::address::AddressAttribute;
use netlink_packet_route::link::{InfoData, InfoKind, LinkAttribute, LinkInfo, LinkMessage};
use netlink_sys::constants::RTMGRP_LINK;
use netlink_sys::{AsyncSocket, SocketAddr, TokioSocket};
use rtnetlink::Handle;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::ethtool;
use crate::link_source::{KernelLink, LinkEvent, LinkSource};

/// `LinkSource` backed by a real `rtnetlink` handle for queries and a
/// dedicated `RTNLGRP_LINK` broadcast socket for events (§4.C "Kernel I/O
/// surface"). One instance per network namespace the netlink probe is
/// rooted in; the namespace probe builds a fresh one after `setns`.
pub struct RtNetlinkSource {
    handle: Handle,
    monitor: Mutex<TokioSocket>,
}

impl RtNetlinkSource {
    /// Opens both the query handle and the monitor socket against whatever
    /// network namespace the calling thread is currently in — the caller
    /// (the netns probe) has already done the `setns` by this point.
    pub fn open_current_namespace() -> std::io::Result<Self> {
        let (connection, handle, _) = rtnetlink::new_connection()?;
        tokio::spawn(connection);

        let mut monitor = TokioSocket::new(libc::NETLINK_ROUTE)?;
        monitor.socket_mut().bind(&SocketAddr::new(0, RTMGRP_LINK))?;
        monitor.socket_mut().connect(&SocketAddr::new(0, 0))?;

        Ok(Self {
            handle,
            monitor: Mutex::new(monitor),
        })
    }

    async fn link_from_message(&self, msg: LinkMessage) -> KernelLink {
        let index = msg.header.index;
        let up = msg.header.flags.bits() & (libc::IFF_UP as u32) != 0;

        let mut name = String::new();
        let mut mac = None;
        let mut mtu = None;
        let mut master_index = None;
        let mut kind = String::new();
        let mut vlan_id = None;
        let mut bond_mode = None;

        for attr in &msg.attributes {
            match attr {
                LinkAttribute::IfName(n) => name = n.clone(),
                LinkAttribute::Address(bytes) => mac = Some(format_mac(bytes)),
                LinkAttribute::Mtu(m) => mtu = Some(*m),
                LinkAttribute::Controller(idx) | LinkAttribute::Master(idx) => {
                    master_index = Some(*idx)
                }
                LinkAttribute::LinkInfo(infos) => {
                    for info in infos {
                        match info {
                            LinkInfo::Kind(InfoKind::Bridge) => kind = "bridge".into(),
                            LinkInfo::Kind(InfoKind::Veth) => kind = "veth".into(),
                            LinkInfo::Kind(InfoKind::Vlan) => kind = "vlan".into(),
                            LinkInfo::Kind(InfoKind::Bond) => kind = "bond".into(),
                            LinkInfo::Kind(InfoKind::Other(k)) => kind = k.clone(),
                            LinkInfo::Kind(_) => {}
                            LinkInfo::Data(InfoData::Vlan(vlan_attrs)) => {
                                for v in vlan_attrs {
                                    if let netlink_packet_route::link::InfoVlan::Id(id) = v {
                                        vlan_id = Some(*id as i64);
                                    }
                                }
                            }
                            LinkInfo::Data(InfoData::Bond(bond_attrs)) => {
                                for b in bond_attrs {
                                    if let netlink_packet_route::link::InfoBond::Mode(mode) = b {
                                        bond_mode = Some(format!("{mode:?}"));
                                    }
                                }
                            }
                            LinkInfo::Data(_) => {}
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        let ipv4 = self.addresses_for(index).await;
        let driver = if name.is_empty() {
            String::new()
        } else {
            let ifname = name.clone();
            tokio::task::spawn_blocking(move || ethtool::driver_name(&ifname))
                .await
                .unwrap_or_default()
        };

        KernelLink {
            index,
            name,
            kind,
            mac,
            mtu,
            ipv4,
            up,
            master_index,
            vlan_id,
            bond_mode,
            driver,
        }
    }

    async fn addresses_for(&self, index: u32) -> String {
        let mut addrs = self.handle.address().get().set_link_index_filter(index).execute();
        let mut cidrs = Vec::new();
        loop {
            match addrs.try_next().await {
                Ok(Some(msg)) => {
                    let prefix_len = msg.header.prefix_len;
                    for attr in &msg.attributes {
                        if let AddressAttribute::Address(IpAddr::V4(addr)) = attr {
                            cidrs.push(format!("{addr}/{prefix_len}"));
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(%e, ifindex = index, "failed to enumerate addresses");
                    break;
                }
            }
        }
        cidrs.join(",")
    }
}

fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

impl LinkSource for RtNetlinkSource {
    fn list_links(&self) -> Pin<Box<dyn Future<Output = Vec<KernelLink>> + Send + '_>> {
        Box::pin(async move {
            let mut links = self.handle.link().get().execute();
            let mut out = Vec::new();
            loop {
                match links.try_next().await {
                    Ok(Some(msg)) => out.push(self.link_from_message(msg).await),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(%e, "failed to enumerate links, stopping enumeration early");
                        break;
                    }
                }
            }
            out
        })
    }

    fn get_link(&self, index: u32) -> Pin<Box<dyn Future<Output = Option<KernelLink>> + Send + '_>> {
        Box::pin(async move {
            let mut req = self.handle.link().get().match_index(index).execute();
            match req.try_next().await {
                Ok(Some(msg)) => Some(self.link_from_message(msg).await),
                Ok(None) => None,
                Err(e) => {
                    debug!(%e, ifindex = index, "link vanished before it could be resolved");
                    None
                }
            }
        })
    }

    fn peer_ifindex(&self, index: u32) -> Pin<Box<dyn Future<Output = Option<u32>> + Send + '_>> {
        Box::pin(async move {
            let link = self.get_link(index).await?;
            if link.name.is_empty() {
                return None;
            }
            tokio::task::spawn_blocking(move || ethtool::veth_peer_ifindex(&link.name))
                .await
                .unwrap_or(None)
        })
    }

    fn next_event(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Option<LinkEvent>> + Send + '_>> {
        Box::pin(async move {
            let mut socket = self.monitor.lock().await;
            let mut buf = vec![0u8; 8192];
            let recv = tokio::time::timeout(timeout, socket.recv_from(&mut buf));
            let (n, _addr) = match recv.await {
                Ok(Ok(v)) => v,
                Ok(Err(e)) => {
                    warn!(%e, "netlink monitor socket read failed");
                    return None;
                }
                Err(_) => return None,
            };
            drop(socket);

            let parsed = NetlinkMessage::<RouteNetlinkMessage>::deserialize(&buf[..n]);
            let msg = match parsed {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(%e, "failed to decode netlink notification, skipping");
                    return None;
                }
            };

            match msg.payload {
                NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewLink(link)) => {
                    Some(LinkEvent::New(link.header.index))
                }
                NetlinkPayload::InnerMessage(RouteNetlinkMessage::DelLink(link)) => {
                    Some(LinkEvent::Del(link.header.index))
                }
                _ => None,
            }
        })
    }
}
