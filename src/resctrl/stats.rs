//! Capability and usage snapshot for a group
//!
//! ```text
//! <root>/info/L3/{cbm_mask,min_cbm_bits,num_closids}
//! <root>/info/L3_CODE/...                  ← in place of info/L3 with CDP on
//! <root>/info/MB/{bandwidth_gran,delay_linear,min_bandwidth,num_closids}
//! <root>/schemata                          ← default group policy
//! <group>/schemata                         ← this group's policy
//! <group>/mon_data/mon_L3_XX/{llc_occupancy,mbm_total_bytes,mbm_local_bytes}
//! ```

use std::io;
use std::path::Path;

use serde::Serialize;

use super::error::RdtError;
use super::fs::ControlFs;
use super::resolver::{Feature, RdtResolver};

/// L3 cache allocation limits from `info/L3` (`info/L3_CODE` under CDP)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct L3CacheInfo {
    /// Widest valid capacity bitmask
    pub cbm_mask: String,
    pub min_cbm_bits: u64,
    pub num_closids: u64,
}

/// Memory bandwidth allocation limits from `info/MB`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemBwInfo {
    pub bandwidth_gran: u64,
    pub delay_linear: u64,
    pub min_bandwidth: u64,
    pub num_closids: u64,
}

/// Monitoring counters for one L3 domain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainMonitoring {
    /// Directory name, e.g. `mon_L3_00`
    pub domain: String,
    pub llc_occupancy: Option<u64>,
    pub mbm_total_bytes: Option<u64>,
    pub mbm_local_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RdtStats {
    pub l3_info: Option<L3CacheInfo>,
    pub mem_bw_info: Option<MemBwInfo>,
    pub root_schemata: String,
    pub schemata: String,
    pub monitoring: Vec<DomainMonitoring>,
}

fn read_string(fs: &dyn ControlFs, path: &Path) -> Result<String, RdtError> {
    fs.read_file(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| RdtError::fs("read", path, e))
}

fn read_u64(fs: &dyn ControlFs, path: &Path) -> Result<u64, RdtError> {
    read_string(fs, path)?.parse().map_err(|e| {
        RdtError::fs("parse", path, io::Error::new(io::ErrorKind::InvalidData, e))
    })
}

// Counters read "Unavailable" while the hardware has no value yet
fn read_counter(fs: &dyn ControlFs, path: &Path) -> Option<u64> {
    fs.read_file(path).ok()?.trim().parse().ok()
}

/// Collect stats for the group at `group`
pub fn read_stats(
    fs: &dyn ControlFs,
    resolver: &dyn RdtResolver,
    group: &Path,
) -> Result<RdtStats, RdtError> {
    let root = resolver
        .root_path()
        .ok_or_else(|| RdtError::Unsupported("resctrl filesystem is not mounted".to_string()))?;
    let info = root.join("info");

    let mut stats = RdtStats {
        root_schemata: read_string(fs, &root.join("schemata"))?,
        schemata: read_string(fs, &group.join("schemata"))?,
        ..Default::default()
    };

    if resolver.is_supported(Feature::CacheAllocation) {
        // With CDP on, code and data masks share limits; info/L3 is absent
        let l3 = Some(info.join("L3"))
            .filter(|dir| fs.exists(dir))
            .unwrap_or_else(|| info.join("L3_CODE"));
        stats.l3_info = Some(L3CacheInfo {
            cbm_mask: read_string(fs, &l3.join("cbm_mask"))?,
            min_cbm_bits: read_u64(fs, &l3.join("min_cbm_bits"))?,
            num_closids: read_u64(fs, &l3.join("num_closids"))?,
        });
    }

    if resolver.is_supported(Feature::BandwidthAllocation) {
        let mb = info.join("MB");
        stats.mem_bw_info = Some(MemBwInfo {
            bandwidth_gran: read_u64(fs, &mb.join("bandwidth_gran"))?,
            delay_linear: read_u64(fs, &mb.join("delay_linear"))?,
            min_bandwidth: read_u64(fs, &mb.join("min_bandwidth"))?,
            num_closids: read_u64(fs, &mb.join("num_closids"))?,
        });
    }

    let mon_data = group.join("mon_data");
    if resolver.is_supported(Feature::Monitoring) && fs.exists(&mon_data) {
        let domains = fs
            .list_dir(&mon_data)
            .map_err(|e| RdtError::fs("list", &mon_data, e))?;
        for domain in domains.into_iter().filter(|d| d.starts_with("mon_L3_")) {
            let dir = mon_data.join(&domain);
            stats.monitoring.push(DomainMonitoring {
                llc_occupancy: read_counter(fs, &dir.join("llc_occupancy")),
                mbm_total_bytes: read_counter(fs, &dir.join("mbm_total_bytes")),
                mbm_local_bytes: read_counter(fs, &dir.join("mbm_local_bytes")),
                domain,
            });
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resctrl::fs::HostFs;
    use crate::resctrl::resolver::{Features, StaticResolver};
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_read_stats() {
        let root = tempfile::tempdir().unwrap();
        let r = root.path();
        write(&r.join("schemata"), "L3:0=fff\nMB:0=100\n");
        write(&r.join("info/L3/cbm_mask"), "fff\n");
        write(&r.join("info/L3/min_cbm_bits"), "1\n");
        write(&r.join("info/L3/num_closids"), "16\n");
        write(&r.join("info/MB/bandwidth_gran"), "10\n");
        write(&r.join("info/MB/delay_linear"), "1\n");
        write(&r.join("info/MB/min_bandwidth"), "10\n");
        write(&r.join("info/MB/num_closids"), "8\n");

        let group = r.join("gold");
        write(&group.join("schemata"), "L3:0=0f0\nMB:0=50\n");
        write(&group.join("mon_data/mon_L3_00/llc_occupancy"), "4096\n");
        write(&group.join("mon_data/mon_L3_00/mbm_total_bytes"), "Unavailable\n");

        let resolver = StaticResolver::new(r, Features::all());
        let stats = read_stats(&HostFs, &resolver, &group).unwrap();

        assert_eq!(stats.root_schemata, "L3:0=fff\nMB:0=100");
        assert_eq!(stats.schemata, "L3:0=0f0\nMB:0=50");
        assert_eq!(
            stats.l3_info,
            Some(L3CacheInfo {
                cbm_mask: "fff".to_string(),
                min_cbm_bits: 1,
                num_closids: 16,
            })
        );
        assert_eq!(stats.mem_bw_info.as_ref().map(|m| m.num_closids), Some(8));
        assert_eq!(stats.monitoring.len(), 1);
        assert_eq!(stats.monitoring[0].domain, "mon_L3_00");
        assert_eq!(stats.monitoring[0].llc_occupancy, Some(4096));
        assert_eq!(stats.monitoring[0].mbm_total_bytes, None);
        assert_eq!(stats.monitoring[0].mbm_local_bytes, None);
    }

    #[test]
    fn test_read_stats_skips_unsupported_info() {
        let root = tempfile::tempdir().unwrap();
        let r = root.path();
        write(&r.join("schemata"), "L3:0=fff\n");
        write(&r.join("ctr/schemata"), "L3:0=f\n");

        let resolver = StaticResolver::new(r, Features::default());
        let stats = read_stats(&HostFs, &resolver, &r.join("ctr")).unwrap();
        assert!(stats.l3_info.is_none());
        assert!(stats.mem_bw_info.is_none());
        assert!(stats.monitoring.is_empty());
    }

    #[test]
    fn test_read_stats_cdp_layout() {
        let root = tempfile::tempdir().unwrap();
        let r = root.path();
        write(&r.join("schemata"), "L3CODE:0=fff\nL3DATA:0=fff\n");
        write(&r.join("info/L3_CODE/cbm_mask"), "fff\n");
        write(&r.join("info/L3_CODE/min_cbm_bits"), "1\n");
        write(&r.join("info/L3_CODE/num_closids"), "8\n");
        write(&r.join("info/L3_DATA/num_closids"), "8\n");
        write(&r.join("ctr/schemata"), "L3CODE:0=0f0\nL3DATA:0=f\n");

        let features = Features::probe(r);
        assert!(features.cache_allocation);

        let resolver = StaticResolver::new(r, features);
        let stats = read_stats(&HostFs, &resolver, &r.join("ctr")).unwrap();
        assert_eq!(
            stats.l3_info,
            Some(L3CacheInfo {
                cbm_mask: "fff".to_string(),
                min_cbm_bits: 1,
                num_closids: 8,
            })
        );
        assert!(stats.mem_bw_info.is_none());
    }
}
