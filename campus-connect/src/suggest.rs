//! Random pick across everything mirrored ("shake to discover").

use rand::Rng;

use crate::model::{EventListing, Society};

#[derive(Debug, Clone, PartialEq)]
pub enum Suggestion {
    Event(EventListing),
    Society(Society),
}

impl Suggestion {
    pub fn title(&self) -> &str {
        match self {
            Suggestion::Event(listing) => &listing.event.name,
            Suggestion::Society(society) => &society.name,
        }
    }
}

/// Picks uniformly among all events and societies; `None` when both are empty.
pub fn suggest<R: Rng + ?Sized>(events: &[EventListing], societies: &[Society], rng: &mut R) -> Option<Suggestion> {
    let total = events.len() + societies.len();
    if total == 0 {
        return None;
    }
    let pick = rng.gen_range(0..total);
    Some(match events.get(pick) {
        Some(listing) => Suggestion::Event(listing.clone()),
        None => Suggestion::Society(societies[pick - events.len()].clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn society(id: &str) -> Society {
        Society {
            id: id.into(),
            name: format!("Society {id}"),
            ..Society::default()
        }
    }

    #[test]
    fn nothing_to_suggest() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(suggest(&[], &[], &mut rng), None);
    }

    #[test]
    fn every_candidate_is_reachable() {
        let societies = vec![society("S1"), society("S2"), society("S3")];
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            if let Some(Suggestion::Society(society)) = suggest(&[], &societies, &mut rng) {
                seen.insert(society.id);
            }
        }
        assert_eq!(seen.len(), 3);
    }
}
