use crate::client::session::Established;
use crate::codec::TlvKey;
use std::net::Ipv4Addr;

/// Creates and configures the TUN device for an established session.
///
/// The address records in the reply are written from the server's point of
/// view: its DstAddr is our local address and its Addr is our destination.
pub fn open_device(established: &Established) -> crate::Result<tun::AsyncDevice> {
    let mut config = tun::Configuration::default();
    config.mtu(established.mtu).up();

    let local = ipv4_record(established, TlvKey::Ipv4DstAddr);
    let dest = ipv4_record(established, TlvKey::Ipv4Addr);
    if let (Some(local), Some(dest)) = (local, dest) {
        tracing::info!("assigned tunnel addresses {} -> {}", local, dest);
        config.address(local).destination(dest);
    }

    #[cfg(target_os = "linux")]
    config.platform_config(|config| {
        config.ensure_root_privileges(true);
    });

    let dev = match tun::create_as_async(&config) {
        Ok(dev) => dev,
        Err(e) => {
            return Err(e.into());
        }
    };
    Ok(dev)
}

fn ipv4_record(established: &Established, key: TlvKey) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = established.records.get(key)?.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}
