//! Two-cursor merge of timestamp-sorted activity sequences from two mirrors.
//!
//! Matching is exact at second precision. Two recordings of the same session
//! whose start times differ by clock skew end up as two unmatched entries.

use std::cmp::Ordering;
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};

pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl<T> Timestamped for (DateTime<Utc>, T) {
    fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: Timestamped + ?Sized> Timestamped for &T {
    fn timestamp(&self) -> DateTime<Utc> {
        (**self).timestamp()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<A, B> {
    pub only_a: Vec<A>,
    pub both: Vec<(A, B)>,
    pub only_b: Vec<B>,
}

impl<A, B> Default for Reconciliation<A, B> {
    fn default() -> Self {
        Self {
            only_a: Vec::new(),
            both: Vec::new(),
            only_b: Vec::new(),
        }
    }
}

/// Partition two ascending sequences into only-A, both and only-B.
///
/// Both inputs must already be sorted ascending by timestamp; this is not
/// checked.
pub fn reconcile<A, B, IA, IB>(seq_a: IA, seq_b: IB) -> Reconciliation<A, B>
where
    A: Timestamped,
    B: Timestamped,
    IA: IntoIterator<Item = A>,
    IB: IntoIterator<Item = B>,
{
    let mut out = Reconciliation::default();
    let mut rest_a = seq_a.into_iter();
    let mut rest_b = seq_b.into_iter();
    let mut head_a = rest_a.next();
    let mut head_b = rest_b.next();

    loop {
        let (a, b) = match (head_a.take(), head_b.take()) {
            (Some(a), Some(b)) => (a, b),
            (a, b) => {
                head_a = a;
                head_b = b;
                break;
            }
        };
        match a.timestamp().cmp(&b.timestamp()) {
            Ordering::Less => {
                out.only_a.push(a);
                head_a = rest_a.next();
                head_b = Some(b);
            }
            Ordering::Equal => {
                out.both.push((a, b));
                head_a = rest_a.next();
                head_b = rest_b.next();
            }
            Ordering::Greater => {
                out.only_b.push(b);
                head_a = Some(a);
                head_b = rest_b.next();
            }
        }
    }

    out.only_a.extend(head_a);
    out.only_a.extend(rest_a);
    out.only_b.extend(head_b);
    out.only_b.extend(rest_b);
    out
}

/// Split `items` into consecutive groups of at most `size`.
pub fn batches<T>(items: impl IntoIterator<Item = T>, size: NonZeroUsize) -> Vec<Vec<T>> {
    let size = size.get();
    let mut out: Vec<Vec<T>> = Vec::new();
    for item in items {
        match out.last_mut() {
            Some(group) if group.len() < size => group.push(item),
            _ => {
                let mut group = Vec::with_capacity(size);
                group.push(item);
                out.push(group);
            }
        }
    }
    out
}

impl<A, B> Reconciliation<A, B> {
    /// Upload groups of the A-only entries, most recent first.
    pub fn upload_batches_a(&self, size: NonZeroUsize) -> Vec<Vec<&A>> {
        batches(self.only_a.iter().rev(), size)
    }

    /// Upload groups of the B-only entries, most recent first.
    pub fn upload_batches_b(&self, size: NonZeroUsize) -> Vec<Vec<&B>> {
        batches(self.only_b.iter().rev(), size)
    }
}
