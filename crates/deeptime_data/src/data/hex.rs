use serde::{Deserialize, Serialize};

/// Axial hex coordinate. Neighbors are the six axial offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Axial {
    pub q: i32,
    pub r: i32,
}

pub const HEX_OFFSETS: [(i32, i32); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

impl Axial {
    pub fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    pub fn neighbors(&self) -> [Axial; 6] {
        let mut out = [*self; 6];
        for (i, (dq, dr)) in HEX_OFFSETS.iter().enumerate() {
            out[i] = Axial::new(self.q + dq, self.r + dr);
        }
        out
    }

    /// Hex distance on the axial grid.
    pub fn distance(&self, other: &Axial) -> u32 {
        let dq = (self.q - other.q).abs();
        let dr = (self.r - other.r).abs();
        let ds = (self.q + self.r - other.q - other.r).abs();
        ((dq + dr + ds) / 2) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = Axial::new(3, -2);
        assert_eq!(a.distance(&a), 0);
    }

    #[test]
    fn test_all_neighbors_at_distance_one() {
        let center = Axial::new(0, 0);
        for n in center.neighbors() {
            assert_eq!(center.distance(&n), 1);
        }
    }

    #[test]
    fn test_distance_symmetric() {
        let a = Axial::new(2, 3);
        let b = Axial::new(-1, 5);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert_eq!(a.distance(&b), 5);
    }
}
