//! One ordered, user visible list stored as several typed buckets.
//!
//! A policy keeps its source/destination "address like" selections in four separate sequences
//! (plain addresses, address groups, internet services, virtual IPs) and its subjects in two
//! (users, groups), because that's the shape the stored templates and the generated CLI expect.
//! The UI however shows each of them as a single list. All position arithmetic between the two
//! views lives here: callers only ever talk in logical positions.
//!
//! Buckets are concatenated in a fixed precedence order given by [BucketKind::ORDER]. Moving an
//! element to another bucket ("retype") re-inserts it at `position - offset(new bucket)`, clamped
//! to the new bucket's bounds. That keeps the element where the user put it whenever the bucket
//! layout allows it; when it doesn't, the element lands at the nearest edge of its new bucket.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::errors::{EditorError, EditorResult};

/// The kind of one bucket. `ORDER` is the precedence in which buckets are concatenated.
pub trait BucketKind: Copy + Eq + fmt::Debug + 'static {
    const ORDER: &'static [Self];

    /// Prefix used for this kind in tagged selection values (`kind:value`)
    fn tag(&self) -> &'static str;

    fn from_tag(tag: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|k| k.tag() == tag)
    }
}

/// Kinds of the address-like list, in precedence order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressKind {
    Address,
    AddressGroup,
    InternetService,
    Vip,
}

impl BucketKind for AddressKind {
    const ORDER: &'static [Self] = &[
        AddressKind::Address,
        AddressKind::AddressGroup,
        AddressKind::InternetService,
        AddressKind::Vip,
    ];

    fn tag(&self) -> &'static str {
        match self {
            AddressKind::Address => "address",
            AddressKind::AddressGroup => "address_group",
            AddressKind::InternetService => "isdb",
            AddressKind::Vip => "vip",
        }
    }
}

/// Kinds of the subjects list, in precedence order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubjectKind {
    User,
    Group,
}

impl BucketKind for SubjectKind {
    const ORDER: &'static [Self] = &[SubjectKind::User, SubjectKind::Group];

    fn tag(&self) -> &'static str {
        match self {
            SubjectKind::User => "user",
            SubjectKind::Group => "group",
        }
    }
}

/// One element of the merged view
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection<K> {
    pub kind: K,
    pub value: String,
}

impl<K: BucketKind> Selection<K> {
    pub fn new(kind: K, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl<K: BucketKind> FromStr for Selection<K> {
    type Err = EditorError;

    /// Parses a tagged UI value such as `address_group:office`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, value) = s
            .split_once(':')
            .ok_or_else(|| EditorError::InvalidSelection(format!("missing kind tag in '{}'", s)))?;

        let kind = K::from_tag(tag)
            .ok_or_else(|| EditorError::InvalidSelection(format!("unknown kind '{}'", tag)))?;

        Ok(Selection::new(kind, value))
    }
}

impl<K: BucketKind> fmt::Display for Selection<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.kind.tag(), self.value)
    }
}

/// A logical list backed by one `Vec<String>` per [BucketKind]
pub trait BucketedList {
    type Kind: BucketKind;

    fn bucket(&self, kind: Self::Kind) -> &Vec<String>;
    fn bucket_mut(&mut self, kind: Self::Kind) -> &mut Vec<String>;

    fn logical_len(&self) -> usize {
        Self::Kind::ORDER
            .iter()
            .map(|k| self.bucket(*k).len())
            .sum()
    }

    fn is_empty(&self) -> bool {
        self.logical_len() == 0
    }

    /// Sum of the lengths of all buckets preceding `kind`
    fn offset_of(&self, kind: Self::Kind) -> usize {
        Self::Kind::ORDER
            .iter()
            .take_while(|k| **k != kind)
            .map(|k| self.bucket(*k).len())
            .sum()
    }

    /// Maps a logical position to its bucket and the index inside it
    fn resolve(&self, position: usize) -> EditorResult<(Self::Kind, usize)> {
        let mut remaining = position;

        for kind in Self::Kind::ORDER.iter() {
            let len = self.bucket(*kind).len();
            if remaining < len {
                return Ok((*kind, remaining));
            }
            remaining -= len;
        }

        Err(EditorError::OutOfRange {
            position,
            len: self.logical_len(),
        })
    }

    fn get(&self, position: usize) -> EditorResult<Selection<Self::Kind>> {
        let (kind, index) = self.resolve(position)?;
        Ok(Selection::new(kind, self.bucket(kind)[index].clone()))
    }

    /// Sets the element at `position`, moving it to another bucket if its kind changes.
    /// `position == logical_len()` appends a new element of `kind`.
    fn set_at(&mut self, position: usize, kind: Self::Kind, value: String) -> EditorResult<()> {
        if position == self.logical_len() {
            // every bucket ends at or before the tail, so the clamped index is the bucket end
            debug!(target: "merger", "append {:?} at position {}", kind, position);
            self.bucket_mut(kind).push(value);
            return Ok(());
        }

        let (current, index) = self.resolve(position)?;

        if current == kind {
            self.bucket_mut(kind)[index] = value;
            return Ok(());
        }

        self.bucket_mut(current).remove(index);

        // offsets are taken after the removal
        let target = position
            .saturating_sub(self.offset_of(kind))
            .min(self.bucket(kind).len());

        debug!(target: "merger",
            "retype position {} from {:?}[{}] to {:?}[{}]",
            position, current, index, kind, target);

        self.bucket_mut(kind).insert(target, value);

        Ok(())
    }

    fn set_selection(
        &mut self,
        position: usize,
        selection: Selection<Self::Kind>,
    ) -> EditorResult<()> {
        self.set_at(position, selection.kind, selection.value)
    }

    /// Removes the element at `position`; other buckets are left alone
    fn remove_at(&mut self, position: usize) -> EditorResult<Selection<Self::Kind>> {
        let (kind, index) = self.resolve(position)?;
        let value = self.bucket_mut(kind).remove(index);
        Ok(Selection::new(kind, value))
    }

    /// Appends a blank placeholder at the end of the first bucket. Returns its logical position.
    fn push_placeholder(&mut self) -> usize {
        let first = Self::Kind::ORDER[0];
        let bucket = self.bucket_mut(first);
        bucket.push(String::new());
        bucket.len() - 1
    }

    /// The merged view, in logical order
    fn entries(&self) -> Vec<Selection<Self::Kind>> {
        Self::Kind::ORDER
            .iter()
            .flat_map(|k| {
                self.bucket(*k)
                    .iter()
                    .map(move |v| Selection::new(*k, v.clone()))
            })
            .collect()
    }
}

/// Address-like selections of one direction of a policy
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBuckets {
    pub addresses: Vec<String>,
    pub address_groups: Vec<String>,
    pub internet_services: Vec<String>,
    pub vips: Vec<String>,
}

impl BucketedList for AddressBuckets {
    type Kind = AddressKind;

    fn bucket(&self, kind: AddressKind) -> &Vec<String> {
        match kind {
            AddressKind::Address => &self.addresses,
            AddressKind::AddressGroup => &self.address_groups,
            AddressKind::InternetService => &self.internet_services,
            AddressKind::Vip => &self.vips,
        }
    }

    fn bucket_mut(&mut self, kind: AddressKind) -> &mut Vec<String> {
        match kind {
            AddressKind::Address => &mut self.addresses,
            AddressKind::AddressGroup => &mut self.address_groups,
            AddressKind::InternetService => &mut self.internet_services,
            AddressKind::Vip => &mut self.vips,
        }
    }
}

/// Users and groups a policy applies to
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectBuckets {
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

impl BucketedList for SubjectBuckets {
    type Kind = SubjectKind;

    fn bucket(&self, kind: SubjectKind) -> &Vec<String> {
        match kind {
            SubjectKind::User => &self.users,
            SubjectKind::Group => &self.groups,
        }
    }

    fn bucket_mut(&mut self, kind: SubjectKind) -> &mut Vec<String> {
        match kind {
            SubjectKind::User => &mut self.users,
            SubjectKind::Group => &mut self.groups,
        }
    }
}
