//! RRSIG checks shared by the chain walk and the denial proofs. Signature math itself is done by
//! `hickory-proto` through its `Verifier` implementation for DNSKEY.

use hickory_proto::rr::dnssec::Verifier;
use hickory_proto::rr::dnssec::rdata::{DNSKEY, DNSSECRData, RRSIG};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tracing::trace;

/// Whether `now` falls inside the signature's inception/expiration window (RFC 4034 serial
/// number arithmetic)
pub fn within_window(sig: &RRSIG, now: u32) -> bool {
    let since_inception = now.wrapping_sub(sig.sig_inception()) as i32;
    let until_expiration = sig.sig_expiration().wrapping_sub(now) as i32;
    since_inception >= 0 && until_expiration >= 0
}

/// Records of the RRset `(owner, record_type)` from a section
pub fn rrset(records: &[Record], owner: &Name, record_type: RecordType) -> Vec<Record> {
    records
        .iter()
        .filter(|r| r.record_type() == record_type && r.name() == owner)
        .cloned()
        .collect()
}

/// Verify `sig` over `rrset` with whichever of `keys` carries the signature's key tag.
///
/// Returns the key that produced a valid signature, or a description of why none did.
pub fn verify_with_keys<'k>(
    owner: &Name,
    sig: &RRSIG,
    rrset: &[Record],
    keys: &[&'k DNSKEY],
    now: u32,
) -> Result<&'k DNSKEY, String> {
    if rrset.is_empty() {
        return Err(format!("no {} records to verify at {}", sig.type_covered(), owner));
    }
    if !within_window(sig, now) {
        return Err(format!(
            "signature by key {} outside validity window {}..{}",
            sig.key_tag(),
            sig.sig_inception(),
            sig.sig_expiration()
        ));
    }

    let dns_class = rrset[0].dns_class();
    let mut candidates = 0;
    for key in keys {
        if key.revoke() || key.algorithm() != sig.algorithm() {
            continue;
        }
        if key.calculate_key_tag().ok() != Some(sig.key_tag()) {
            continue;
        }
        candidates += 1;
        match key.verify_rrsig(owner, dns_class, sig, rrset) {
            Ok(()) => return Ok(*key),
            Err(e) => trace!("key {} rejected signature over {}: {}", sig.key_tag(), owner, e),
        }
    }

    if candidates == 0 {
        Err(format!("no key with tag {}", sig.key_tag()))
    } else {
        Err(format!("signature by key {} did not verify", sig.key_tag()))
    }
}

/// Verify the RRset `(owner, record_type)` against every RRSIG covering it in `section`,
/// succeeding on the first signature that verifies. Returns the signing keys that verified.
pub fn verify_section<'k>(
    section: &[Record],
    owner: &Name,
    record_type: RecordType,
    keys: &[&'k DNSKEY],
    now: u32,
) -> Result<Vec<&'k DNSKEY>, String> {
    let records = rrset(section, owner, record_type);
    let mut verified = Vec::new();
    let mut last_error = format!("no RRSIG covering {} {}", owner, record_type);

    for sig in signatures_for(section, owner, record_type) {
        match verify_with_keys(owner, sig, &records, keys, now) {
            Ok(key) => verified.push(key),
            Err(e) => last_error = e,
        }
    }

    if verified.is_empty() {
        Err(last_error)
    } else {
        Ok(verified)
    }
}

/// RRSIGs in `section` covering `(owner, record_type)`
pub fn signatures_for<'a>(
    section: &'a [Record],
    owner: &'a Name,
    record_type: RecordType,
) -> impl Iterator<Item = &'a RRSIG> {
    section.iter().filter_map(move |r| match r.data() {
        Some(RData::DNSSEC(DNSSECRData::RRSIG(sig)))
            if r.name() == owner && sig.type_covered() == record_type =>
        {
            Some(sig)
        }
        _ => None,
    })
}
