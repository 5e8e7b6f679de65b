/// Format a 6-byte hardware address as lowercase hex, colon-separated.
#[inline]
#[must_use]
pub fn format_mac(mac: [u8; 6]) -> String {
    mac.iter()
        .map(|byte| hex::encode([*byte]))
        .collect::<Vec<_>>()
        .join(":")
}
