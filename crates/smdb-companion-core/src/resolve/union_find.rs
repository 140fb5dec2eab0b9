/// Disjoint sets over `0..n`, stored as parent indices.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// Link every member of `group` together.
    pub fn union_all(&mut self, group: &[usize]) {
        if let Some((&first, rest)) = group.split_first() {
            for &other in rest {
                self.union(first, other);
            }
        }
    }

    /// All sets, each sorted ascending, ordered by their smallest member.
    pub fn sets(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut by_root: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            let root = self.find(i);
            by_root[root].push(i);
        }
        let mut sets: Vec<Vec<usize>> = by_root.into_iter().filter(|s| !s.is_empty()).collect();
        sets.sort_by_key(|s| s[0]);
        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitive_links_merge() {
        let mut uf = UnionFind::new(6);
        uf.union_all(&[0, 2]);
        uf.union_all(&[2, 4]);
        uf.union(1, 5);
        assert_eq!(uf.find(0), uf.find(4));
        assert_ne!(uf.find(0), uf.find(1));
        assert_eq!(uf.sets(), vec![vec![0, 2, 4], vec![1, 5], vec![3]]);
    }

    #[test]
    fn test_union_is_idempotent() {
        let mut uf = UnionFind::new(3);
        uf.union(0, 1);
        uf.union(1, 0);
        uf.union(0, 1);
        assert_eq!(uf.sets(), vec![vec![0, 1], vec![2]]);
    }
}
