use std::collections::HashMap;

use rand::Rng;

use aqfish_domain::{ApplicationUid, NodeUid, Vote, VoteUid};

/// Produce this node's Vote for `application_uid` (§4.3 step 1). `available`
/// comes from the capacity accountant; `rand` is the tie-break value.
pub fn cast_vote(node_uid: NodeUid, application_uid: ApplicationUid, available: bool) -> Vote {
    Vote {
        uid: VoteUid::new_derived(node_uid.prefix_of()),
        application_uid,
        node_uid,
        available,
        rand: rand::thread_rng().gen(),
        created_at: chrono::Utc::now(),
    }
}

/// Collapse a raw vote stream to at most one Vote per node for this
/// Application (I1): a late arrival from a node that already voted is
/// ignored, keeping the earliest (§4.3 step 2).
pub fn collect_votes(votes: &[Vote]) -> Vec<Vote> {
    let mut by_node: HashMap<NodeUid, Vote> = HashMap::new();
    for vote in votes {
        by_node
            .entry(vote.node_uid)
            .and_modify(|existing| {
                if vote.created_at < existing.created_at {
                    *existing = *vote;
                }
            })
            .or_insert(*vote);
    }
    by_node.into_values().collect()
}

/// Deterministic winner among votes with `available=true`: higher `rand`,
/// then higher `nodeUID` lexicographically (§4.3 step 4). `None` means no
/// node offered capacity this round.
pub fn select_winner(votes: &[Vote]) -> Option<NodeUid> {
    collect_votes(votes)
        .into_iter()
        .filter(|v| v.available)
        .max_by(|a, b| a.rand.cmp(&b.rand).then_with(|| a.node_uid.cmp(&b.node_uid)))
        .map(|v| v.node_uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn vote(node_prefix: u8, available: bool, rand: u32) -> Vote {
        let node_uid = NodeUid::new_derived([node_prefix; 6]);
        Vote {
            uid: VoteUid::new_derived([node_prefix; 6]),
            application_uid: ApplicationUid::new_derived([0; 6]),
            node_uid,
            available,
            rand,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn winner_is_highest_rand_among_available() {
        let votes = vec![vote(1, true, 5), vote(2, true, 9), vote(3, false, 100)];
        let winner = select_winner(&votes).unwrap();
        assert_eq!(winner, votes[1].node_uid);
    }

    #[test]
    fn no_available_votes_yields_no_winner() {
        let votes = vec![vote(1, false, 5), vote(2, false, 9)];
        assert!(select_winner(&votes).is_none());
    }

    #[test]
    fn tied_rand_breaks_by_higher_node_uid() {
        let mut a = vote(1, true, 7);
        let mut b = vote(2, true, 7);
        // Force a deterministic ordering between the two node UIDs.
        if a.node_uid > b.node_uid {
            std::mem::swap(&mut a, &mut b);
        }
        let winner = select_winner(&[a, b]).unwrap();
        assert_eq!(winner, b.node_uid);
    }

    #[test]
    fn late_duplicate_vote_from_same_node_is_ignored() {
        let node_uid = NodeUid::new_derived([1; 6]);
        let earlier = Vote {
            uid: VoteUid::new_derived([1; 6]),
            application_uid: ApplicationUid::new_derived([0; 6]),
            node_uid,
            available: true,
            rand: 1,
            created_at: Utc::now() - chrono::Duration::seconds(10),
        };
        let later = Vote { rand: 999, created_at: Utc::now(), ..earlier };
        let collected = collect_votes(&[earlier, later]);
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].rand, 1);
    }
}
