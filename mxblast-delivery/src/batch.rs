//! Recipient batching.
//!
//! Delivery works in units of a [`Batch`]: a group of recipients that
//! share one domain and travel through one SMTP transaction. [`batch`]
//! groups an arbitrary recipient list by domain before chunking, so every
//! batch it produces is domain-homogeneous by construction.

use std::num::NonZeroUsize;

use ahash::AHashMap;

use mxblast_common::{Address, Domain};

/// A group of recipients delivered as one unit.
///
/// The resolution domain is taken from the first recipient. Batches built
/// by [`batch`] always share a single domain; a hand-built batch that
/// spans domains will be resolved through its first recipient's domain
/// only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    recipients: Vec<Address>,
}

impl Batch {
    #[must_use]
    pub const fn new(recipients: Vec<Address>) -> Self {
        Self { recipients }
    }

    #[must_use]
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// The domain MX resolution will use: the first recipient's.
    #[must_use]
    pub fn domain(&self) -> Option<&Domain> {
        self.recipients.first().map(Address::domain)
    }
}

/// Partition recipients into delivery batches of at most `size`.
///
/// Recipients are first grouped by domain (groups ordered by each
/// domain's first appearance, input order preserved within a group), and
/// each group is then chunked. For a single-domain input this reduces to
/// plain contiguous chunking: `⌈N/size⌉` batches, all but possibly the
/// last of exactly `size` recipients, concatenating back to the input.
///
/// Pure function: no I/O, deterministic.
#[must_use]
pub fn batch(recipients: &[Address], size: NonZeroUsize) -> Vec<Batch> {
    let mut order: Vec<&Domain> = Vec::new();
    let mut groups: AHashMap<&Domain, Vec<Address>> = AHashMap::new();

    for recipient in recipients {
        let domain = recipient.domain();
        groups
            .entry(domain)
            .or_insert_with(|| {
                order.push(domain);
                Vec::new()
            })
            .push(recipient.clone());
    }

    order
        .into_iter()
        .flat_map(|domain| {
            groups[domain]
                .chunks(size.get())
                .map(|chunk| Batch::new(chunk.to_vec()))
                .collect::<Vec<_>>()
        })
        .collect()
}
