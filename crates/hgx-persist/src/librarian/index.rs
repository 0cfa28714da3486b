use std::collections::{BTreeSet, HashMap};

use hgx_golix::Primitive;
use hgx_types::Ghid;

/// Relationship indices between cached primitives.
#[derive(Debug, Default)]
pub(crate) struct LibraryIndex {
    bound: HashMap<Ghid, BTreeSet<Ghid>>,
    debound: HashMap<Ghid, BTreeSet<Ghid>>,
    requests: HashMap<Ghid, BTreeSet<Ghid>>,
    resolver: HashMap<Ghid, Ghid>,
    /// Superseded frame ghid to its logical ghid.
    retired: HashMap<Ghid, Ghid>,
}

fn insert(map: &mut HashMap<Ghid, BTreeSet<Ghid>>, key: Ghid, value: Ghid) {
    map.entry(key).or_default().insert(value);
}

fn discard(map: &mut HashMap<Ghid, BTreeSet<Ghid>>, key: &Ghid, value: &Ghid) {
    if let Some(set) = map.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

fn read(map: &HashMap<Ghid, BTreeSet<Ghid>>, key: &Ghid) -> BTreeSet<Ghid> {
    map.get(key).cloned().unwrap_or_default()
}

impl LibraryIndex {
    /// Record a primitive's contributions. `previous` is the frame this
    /// primitive supersedes, for dynamic bindings.
    pub fn add(&mut self, primitive: &Primitive, previous: Option<&Primitive>) {
        match primitive {
            Primitive::StaticBinding(b) => insert(&mut self.bound, b.target, b.ghid),
            Primitive::DynamicBinding(b) => {
                if let Some(old) = previous {
                    if let Some(old_target) = old.target() {
                        discard(&mut self.bound, &old_target, &b.ghid);
                    }
                    self.retired.insert(old.reference_ghid(), b.ghid);
                }
                insert(&mut self.bound, b.target(), b.ghid);
                self.resolver.insert(b.ghid, b.frame_ghid);
            }
            Primitive::Debinding(d) => insert(&mut self.debound, d.target, d.ghid),
            Primitive::Request(r) => insert(&mut self.requests, r.recipient, r.ghid),
            Primitive::Identity(_) | Primitive::Container(_) => {}
        }
    }

    /// Drop a primitive's contributions.
    ///
    /// A dynamic frame that is no longer the resolved frame has already had
    /// its binding superseded, so only the resolved frame clears the
    /// bound-by-target entry.
    pub fn remove(&mut self, primitive: &Primitive) {
        match primitive {
            Primitive::StaticBinding(b) => discard(&mut self.bound, &b.target, &b.ghid),
            Primitive::DynamicBinding(b) => match self.resolver.get(&b.ghid) {
                Some(current) if *current != b.frame_ghid => {}
                _ => {
                    self.resolver.remove(&b.ghid);
                    discard(&mut self.bound, &b.target(), &b.ghid);
                }
            },
            Primitive::Debinding(d) => discard(&mut self.debound, &d.target, &d.ghid),
            Primitive::Request(r) => discard(&mut self.requests, &r.recipient, &r.ghid),
            Primitive::Identity(_) | Primitive::Container(_) => {}
        }
    }

    pub fn resolve(&self, ghid: &Ghid) -> Option<Ghid> {
        self.resolver.get(ghid).copied()
    }

    /// Remember a frame that lost to a newer one of the same logical ghid.
    pub fn retire(&mut self, frame: Ghid, logical: Ghid) {
        self.retired.insert(frame, logical);
    }

    pub fn superseded_by(&self, frame: &Ghid) -> Option<Ghid> {
        self.retired.get(frame).copied()
    }

    pub fn bound(&self, target: &Ghid) -> BTreeSet<Ghid> {
        read(&self.bound, target)
    }

    pub fn debound(&self, target: &Ghid) -> BTreeSet<Ghid> {
        read(&self.debound, target)
    }

    pub fn requests(&self, recipient: &Ghid) -> BTreeSet<Ghid> {
        read(&self.requests, recipient)
    }
}
