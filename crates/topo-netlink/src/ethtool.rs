//! Raw ethtool ioctls (§6 "Kernel / host collaborators"): driver name and
//! veth peer ifindex. No ethtool crate is wired into the workspace, so this
//! talks to the kernel the way `ethtool(8)` itself does — a `SIOCETHTOOL`
//! ioctl over a throwaway `AF_INET`/`SOCK_DGRAM` socket, carrying a command
//! struct keyed by `ifr_name`.

use std::ffi::CString;
use std::mem;
use std::os::unix::io::RawFd;

const SIOCETHTOOL: libc::c_ulong = 0x8946;
const ETHTOOL_GDRVINFO: u32 = 0x0000_0003;
const ETHTOOL_GSTATS: u32 = 0x0000_001d;

const DRVINFO_DRIVER_LEN: usize = 32;

#[repr(C)]
struct EthtoolDrvinfo {
    cmd: u32,
    driver: [libc::c_char; DRVINFO_DRIVER_LEN],
    version: [libc::c_char; 32],
    fw_version: [libc::c_char; 32],
    bus_info: [libc::c_char; 32],
    erom_version: [libc::c_char; 32],
    reserved2: [libc::c_char; 12],
    n_priv_flags: u32,
    n_stats: u32,
    testinfo_len: u32,
    eedump_len: u32,
    regdump_len: u32,
}

#[repr(C)]
struct EthtoolGstrings {
    cmd: u32,
    n_stats: u32,
    // `peer_ifindex` follows as a single u64 stat for veth links, per the
    // kernel veth driver's `ethtool_ops::get_ethtool_stats`.
    data: [u64; 1],
}

#[repr(C)]
struct IfReqEthtool {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_data: *mut libc::c_void,
}

fn open_ioctl_socket() -> Option<RawFd> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 { None } else { Some(fd) }
}

fn ifr_name(name: &str) -> Option<[libc::c_char; libc::IFNAMSIZ]> {
    let c = CString::new(name).ok()?;
    let bytes = c.as_bytes_with_nul();
    if bytes.len() > libc::IFNAMSIZ {
        return None;
    }
    let mut buf = [0 as libc::c_char; libc::IFNAMSIZ];
    for (dst, src) in buf.iter_mut().zip(bytes.iter()) {
        *dst = *src as libc::c_char;
    }
    Some(buf)
}

fn cstr_to_string(bytes: &[libc::c_char]) -> String {
    let raw: Vec<u8> = bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as u8)
        .collect();
    String::from_utf8_lossy(&raw).into_owned()
}

/// `ETHTOOL_GDRVINFO`: the driver name, empty if the link doesn't support
/// ethtool (common for pure-software kinds other than bridge/bond/veth).
pub fn driver_name(ifname: &str) -> String {
    let Some(fd) = open_ioctl_socket() else {
        return String::new();
    };
    let Some(name) = ifr_name(ifname) else {
        unsafe { libc::close(fd) };
        return String::new();
    };

    let mut info = EthtoolDrvinfo {
        cmd: ETHTOOL_GDRVINFO,
        driver: [0; DRVINFO_DRIVER_LEN],
        version: [0; 32],
        fw_version: [0; 32],
        bus_info: [0; 32],
        erom_version: [0; 32],
        reserved2: [0; 12],
        n_priv_flags: 0,
        n_stats: 0,
        testinfo_len: 0,
        eedump_len: 0,
        regdump_len: 0,
    };

    let mut req = IfReqEthtool {
        ifr_name: name,
        ifr_data: &mut info as *mut _ as *mut libc::c_void,
    };

    let rc = unsafe { libc::ioctl(fd, SIOCETHTOOL as _, &mut req as *mut _) };
    unsafe { libc::close(fd) };
    if rc != 0 {
        return String::new();
    }
    cstr_to_string(&info.driver)
}

/// `ETHTOOL_GSTATS`: for a veth link, the kernel exposes its peer's ifindex
/// as a single statistics counter (§4.C "Veth peer").
pub fn veth_peer_ifindex(ifname: &str) -> Option<u32> {
    let fd = open_ioctl_socket()?;
    let name = ifr_name(ifname).or_else(|| {
        unsafe { libc::close(fd) };
        None
    })?;

    let mut stats = EthtoolGstrings {
        cmd: ETHTOOL_GSTATS,
        n_stats: 1,
        data: [0],
    };

    let mut req = IfReqEthtool {
        ifr_name: name,
        ifr_data: &mut stats as *mut _ as *mut libc::c_void,
    };

    let rc = unsafe { libc::ioctl(fd, SIOCETHTOOL as _, &mut req as *mut _) };
    unsafe { libc::close(fd) };
    if rc != 0 {
        return None;
    }
    let peer = stats.data[0] as u32;
    if peer == 0 { None } else { Some(peer) }
}

#[allow(dead_code)]
fn size_check() {
    let _ = mem::size_of::<EthtoolDrvinfo>();
}
