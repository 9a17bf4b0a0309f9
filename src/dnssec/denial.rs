use super::errors::{DnsSecError, Result};
use super::rrsig;
use crate::message::Message;
use hickory_proto::rr::dnssec::Nsec3HashAlgorithm;
use hickory_proto::rr::dnssec::rdata::{DNSKEY, NSEC3};
use hickory_proto::rr::{Name, Record, RecordType};
use tracing::{debug, trace};

/// Upper bound on NSEC3 iterations accepted before hashing (RFC 9276 recommends far less)
pub const MAX_NSEC3_ITERATIONS: u16 = 2500;

/// Iterated NSEC3 hash of `name` (RFC 5155 section 5)
pub fn nsec3_hash(name: &Name, salt: &[u8], iterations: u16) -> Vec<u8> {
    use ring::digest;

    let mut input = super::digest::canonical_name(name);
    input.extend_from_slice(salt);
    let mut hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &input);

    for _ in 0..iterations {
        let mut next = hash.as_ref().to_vec();
        next.extend_from_slice(salt);
        hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &next);
    }

    hash.as_ref().to_vec()
}

/// Hash carried in the first label of an NSEC3 owner name (base32hex, RFC 4648)
pub fn owner_hash(owner: &Name) -> Option<Vec<u8>> {
    let label = owner.iter().next()?;
    let label = std::str::from_utf8(label).ok()?.to_ascii_uppercase();
    base32::decode(base32::Alphabet::Rfc4648Hex { padding: false }, &label)
}

/// An NSEC3 record with its owner hash decoded
struct HashedNsec3<'a> {
    nsec3: &'a NSEC3,
    owner: Vec<u8>,
}

impl HashedNsec3<'_> {
    fn matches(&self, hash: &[u8]) -> bool {
        self.owner == hash
    }

    /// Whether `hash` falls strictly between the owner hash and the next hashed owner
    fn covers(&self, hash: &[u8]) -> bool {
        let owner = self.owner.as_slice();
        let next = self.nsec3.next_hashed_owner_name();
        if owner < next {
            owner < hash && hash < next
        } else {
            // last record in the zone wraps around to the first
            hash > owner || hash < next
        }
    }
}

fn label_count(name: &Name) -> usize {
    name.iter().count()
}

/// Verify that the parent proves `zone` has no DS record.
///
/// The authority section of `response` must hold NSEC3 records, each signed by one of
/// `parent_keys`, that match the closest encloser of `zone` and cover the next closer name. With
/// more than two records, the wildcard at the closest encloser must be covered as well. When the
/// closest encloser is `zone` itself, the matching record must not list DS in its type bitmap.
pub fn verify_ds_denial(
    response: &Message,
    zone: &Name,
    parent_keys: &[&DNSKEY],
    now: u32,
) -> Result<()> {
    let fail = |reason: String| DnsSecError::MissingNonExistenceProof {
        zone: zone.to_string(),
        reason,
    };

    let records = response.nsec3();
    if records.is_empty() {
        return Err(fail("no NSEC3 records".to_string()));
    }

    let authorities = response.authorities();
    let mut hashed = Vec::with_capacity(records.len());
    for (record, nsec3) in &records {
        verify_nsec3_signature(authorities, record, parent_keys, now).map_err(&fail)?;
        let owner = owner_hash(record.name())
            .ok_or_else(|| fail(format!("undecodable NSEC3 owner {}", record.name())))?;
        hashed.push(HashedNsec3 { nsec3, owner });
    }

    let params = hashed[0].nsec3;
    if params.hash_algorithm() != Nsec3HashAlgorithm::SHA1 {
        return Err(fail("unsupported NSEC3 hash algorithm".to_string()));
    }
    if params.iterations() > MAX_NSEC3_ITERATIONS {
        return Err(fail(format!("{} NSEC3 iterations", params.iterations())));
    }
    let hash = |name: &Name| nsec3_hash(name, params.salt(), params.iterations());

    // Closest encloser: the longest ancestor (or the name itself) with a matching record
    let depth = label_count(zone);
    let mut closest = None;
    for labels in (0..=depth).rev() {
        let candidate = zone.trim_to(labels);
        let candidate_hash = hash(&candidate);
        if let Some(record) = hashed.iter().find(|h| h.matches(&candidate_hash)) {
            closest = Some((labels, candidate, record));
            break;
        }
    }
    let Some((encloser_labels, encloser, encloser_record)) = closest else {
        return Err(fail("no NSEC3 matches a closest encloser".to_string()));
    };
    trace!("NSEC3 closest encloser for {} is {}", zone, encloser);

    if encloser_labels == depth {
        // NODATA: the delegation exists but has no DS
        if encloser_record
            .nsec3
            .type_bit_maps()
            .contains(&RecordType::DS)
        {
            return Err(fail("matching NSEC3 lists a DS record".to_string()));
        }
        debug!("NSEC3 proves {} has no DS record", zone);
        return Ok(());
    }

    let next_closer = zone.trim_to(encloser_labels + 1);
    let next_closer_hash = hash(&next_closer);
    if !hashed.iter().any(|h| h.covers(&next_closer_hash)) {
        return Err(fail(format!("no NSEC3 covers next closer name {}", next_closer)));
    }

    if hashed.len() > 2 {
        let wildcard = Name::from_ascii("*")
            .and_then(|star| star.append_domain(&encloser))
            .map_err(|e| fail(format!("cannot build wildcard: {}", e)))?;
        let wildcard_hash = hash(&wildcard);
        if !hashed.iter().any(|h| h.covers(&wildcard_hash)) {
            return Err(fail(format!("no NSEC3 covers wildcard {}", wildcard)));
        }
    }

    debug!("NSEC3 proves {} is an unsigned delegation", zone);
    Ok(())
}

fn verify_nsec3_signature(
    authorities: &[Record],
    record: &Record,
    parent_keys: &[&DNSKEY],
    now: u32,
) -> std::result::Result<(), String> {
    rrsig::verify_section(authorities, record.name(), RecordType::NSEC3, parent_keys, now)
        .map(|_| ())
        .map_err(|e| format!("NSEC3 {}: {}", record.name(), e))
}
