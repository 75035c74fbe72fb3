//! Deterministic maximal independent sets over conflict graphs.
//!
//! A candidate joins the set when its `(quality, global ID)` key beats
//! every undecided or accepted conflicting neighbor; neighbors of accepted
//! keys drop out. Because the ordering is total and partition-independent,
//! the selected set is identical for any rank count.

use crate::arrays::Graph;
use crate::mesh::Mesh;

#[derive(Copy, Clone, PartialEq, Eq)]
enum State {
    Undecided,
    In,
    Out,
}

fn beats(qa: f64, ga: u64, qb: f64, gb: u64) -> bool {
    if qa != qb {
        return qa > qb;
    }
    ga < gb
}

/// Select an independent set among the marked candidates of `key_dim`,
/// with conflicts given explicitly.
pub fn find_indset_with_graph(
    mesh: &Mesh,
    key_dim: usize,
    conflicts: &Graph,
    quals: &[f64],
    cands: &[u8],
) -> Vec<u8> {
    let n = mesh.nents(key_dim);
    assert_eq!(quals.len(), n);
    assert_eq!(cands.len(), n);
    let globals = mesh.globals(key_dim);
    let comm = mesh.comm();
    let mut state: Vec<State> = cands
        .iter()
        .map(|&c| if c != 0 { State::Undecided } else { State::Out })
        .collect();
    loop {
        let mut changed = false;
        let next: Vec<State> = (0..n)
            .map(|k| {
                if state[k] != State::Undecided {
                    return state[k];
                }
                let mut wins = true;
                for &nb in conflicts.row(k as u32) {
                    let nb = nb as usize;
                    match state[nb] {
                        State::In => return State::Out,
                        State::Undecided => {
                            if !beats(quals[k], globals[k], quals[nb], globals[nb]) {
                                wins = false;
                            }
                        }
                        State::Out => {}
                    }
                }
                if wins {
                    State::In
                } else {
                    State::Undecided
                }
            })
            .collect();
        for k in 0..n {
            if next[k] != state[k] {
                changed = true;
            }
        }
        state = next;
        // marks of shared keys must agree before the next round
        let marks: Vec<u8> = state
            .iter()
            .map(|s| match s {
                State::In => 2,
                State::Undecided => 1,
                State::Out => 0,
            })
            .collect();
        let synced = mesh.sync_u8_array(key_dim, &marks, 1);
        state = synced
            .iter()
            .map(|&m| match m {
                2 => State::In,
                1 => State::Undecided,
                _ => State::Out,
            })
            .collect();
        let undecided = state.iter().any(|&s| s == State::Undecided);
        if !comm.reduce_or(undecided) {
            break;
        }
        assert!(
            comm.reduce_or(changed),
            "independent set stopped making progress"
        );
    }
    state.iter().map(|&s| u8::from(s == State::In)).collect()
}

/// Independent set with the default conflict graph: keys of `key_dim`
/// sharing an element conflict.
pub fn find_indset(mesh: &Mesh, key_dim: usize, quals: &[f64], cands: &[u8]) -> Vec<u8> {
    let conflicts = mesh.ask_star(key_dim).clone();
    find_indset_with_graph(mesh, key_dim, &conflicts, quals, cands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::SerialComm;
    use crate::mesh::build::build_box;
    use crate::mesh::EDGE;
    use std::sync::Arc;

    #[test]
    fn higher_quality_wins_and_blocks_neighbors() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        // all five edges are candidates; the diagonal conflicts with all
        let quals = vec![0.3, 0.4, 0.9, 0.5, 0.2];
        let cands = vec![1u8; 5];
        let set = find_indset(&mesh, EDGE, &quals, &cands);
        assert_eq!(set, vec![0, 0, 1, 0, 0]);
    }

    #[test]
    fn ties_break_by_global_id() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        let quals = vec![0.5; 5];
        let set = find_indset(&mesh, EDGE, &quals, &[1; 5]);
        // smallest global wins in each triangle, the diagonal loses to both
        assert_eq!(set, vec![1, 1, 0, 0, 0]);
    }
}
