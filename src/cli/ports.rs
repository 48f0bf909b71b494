//! `apptester ports`

use crate::tester::PortLease;

/// Lease `count` ports at once and print them.
///
/// The leases are held until all are printed, so the ports are distinct.
pub fn run_ports_command(count: usize) -> anyhow::Result<()> {
    let leases = lease_ports(count)?;
    for lease in &leases {
        println!("{}", lease.port());
    }
    Ok(())
}

fn lease_ports(count: usize) -> anyhow::Result<Vec<PortLease>> {
    (0..count)
        .map(|_| PortLease::acquire().map_err(|e| anyhow::anyhow!("could not lease a port: {}", e)))
        .collect()
}
