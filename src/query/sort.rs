use std::cmp::Ordering;

use rand::seq::SliceRandom;
use serde::Deserialize;
use serde::Serialize;

use super::HostEntry;
use crate::NodeItem;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Ip,
    HasIssues,
    Online,
    Trusted,
    Used,
    Accessibility,
    Connectivity,
    DataActivity,
    /// Display order of modes, best first
    Mode,
    Shuffle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// What a listing row exposes to the sort keys
pub trait Sortable {
    fn sort_item(&self) -> &NodeItem;

    fn mode_rank(&self) -> usize;

    /// Bytes counted as used: total minus free
    fn used_bytes(&self) -> u64;

    fn online(&self) -> bool {
        self.sort_item().status.online
    }
}

impl Sortable for NodeItem {
    fn sort_item(&self) -> &NodeItem {
        self
    }

    fn mode_rank(&self) -> usize {
        self.status.mode.compare_rank()
    }

    fn used_bytes(&self) -> u64 {
        self.node.storage.total.saturating_sub(self.node.storage.free)
    }
}

impl Sortable for HostEntry {
    fn sort_item(&self) -> &NodeItem {
        &self.root
    }

    fn mode_rank(&self) -> usize {
        self.status.mode.compare_rank()
    }

    fn used_bytes(&self) -> u64 {
        self.status.storage.total.saturating_sub(self.status.storage.free)
    }

    fn online(&self) -> bool {
        self.status.online
    }
}

fn compare<T: Sortable>(
    a: &T,
    b: &T,
    key: SortKey,
) -> Ordering {
    let (x, y) = (a.sort_item(), b.sort_item());
    match key {
        SortKey::Name => x.node.name.cmp(&y.node.name),
        SortKey::Ip => x.node.ip.cmp(&y.node.ip),
        SortKey::HasIssues => x.status.has_issues.cmp(&y.status.has_issues),
        SortKey::Online => a.online().cmp(&b.online()),
        SortKey::Trusted => x.status.trusted.cmp(&y.status.trusted),
        SortKey::Used => a.used_bytes().cmp(&b.used_bytes()),
        SortKey::Accessibility => x.status.accessibility.as_str().cmp(y.status.accessibility.as_str()),
        SortKey::Connectivity => x.status.connectivity.cmp(&y.status.connectivity),
        SortKey::DataActivity => {
            let reason = |item: &NodeItem| item.data_activity.as_ref().map(|act| act.reason.as_str());
            reason(x).cmp(&reason(y))
        }
        SortKey::Mode => a.mode_rank().cmp(&b.mode_rank()),
        SortKey::Shuffle => Ordering::Equal,
    }
}

/// Stable sort; ties keep their listing order
pub fn sort_list<T: Sortable>(
    list: &mut [T],
    key: SortKey,
    order: SortOrder,
) {
    if key == SortKey::Shuffle {
        list.shuffle(&mut rand::thread_rng());
        return;
    }
    list.sort_by(|a, b| {
        let ordering = compare(a, b, key);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

pub fn paginate<T>(
    list: Vec<T>,
    skip: usize,
    limit: Option<usize>,
) -> Vec<T> {
    let rest = list.into_iter().skip(skip);
    match limit {
        Some(limit) => rest.take(limit).collect(),
        None => rest.collect(),
    }
}
