//! Longest-prefix-match search over (network, mask) pairs (§4.7, scenario
//! 6): binary-search the network-indexed column to the first address
//! greater than the query, then walk backward comparing masked addresses.
//! Ascending network order makes the first backward match the most
//! specific one for a well-formed (non-overlapping) routing table.
use crate::image::Image;
use crate::schema::{NetV4Query, Schema};
use std::net::Ipv4Addr;

pub fn lookup(_schema: &Schema, image: &Image, netv4: &NetV4Query, query: Ipv4Addr) -> Option<u64> {
    let q = u32::from(query);
    let len = image.index_len(netv4.index_col);
    if len == 0 {
        return None;
    }

    let mut lo = 0usize;
    let mut hi = len;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let addr = image.index_row_addr(netv4.index_col, mid)?;
        let net = image.cell_at(addr, netv4.network_col) as u32;
        if net <= q {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    let mut i = lo;
    while i > 0 {
        i -= 1;
        let addr = image.index_row_addr(netv4.index_col, i)?;
        let net = image.cell_at(addr, netv4.network_col) as u32;
        let mask = image.cell_at(addr, netv4.mask_col) as u32;
        if (net & mask) == (q & mask) {
            return Some(addr);
        }
    }
    None
}
