use std::collections::HashMap;
use std::hash::Hash;

/// Union-find over a fixed, finite set of elements.
///
/// Elements are assigned stable integer ids at construction so that `find`
/// and `union` work on indices rather than re-hashing the element on every
/// parent hop. `find` uses path compression, `union` balances by rank.
///
/// Passing an element that was not supplied at construction is a caller bug
/// and panics.
pub struct DisjointSet<T> {
    index: HashMap<T, usize>,
    elements: Vec<T>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl<T: Eq + Hash + Clone> DisjointSet<T> {
    pub fn new<I: IntoIterator<Item = T>>(elements: I) -> Self {
        let mut set = Self {
            index: HashMap::new(),
            elements: Vec::new(),
            parent: Vec::new(),
            rank: Vec::new(),
        };
        for element in elements {
            if !set.index.contains_key(&element) {
                let id = set.elements.len();
                set.index.insert(element.clone(), id);
                set.elements.push(element);
                set.parent.push(id);
                set.rank.push(0);
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the representative id of the component containing `element`.
    pub fn find(&mut self, element: &T) -> usize {
        let id = self.index[element];
        self.find_id(id)
    }

    fn find_id(&mut self, id: usize) -> usize {
        let mut root = id;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Compress the path walked above.
        let mut cursor = id;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    /// Merges the components of `a` and `b`. Returns false when they were
    /// already in the same component.
    pub fn union(&mut self, a: &T, b: &T) -> bool {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }
        if self.rank[root_a] < self.rank[root_b] {
            self.parent[root_a] = root_b;
        } else if self.rank[root_a] > self.rank[root_b] {
            self.parent[root_b] = root_a;
        } else {
            self.parent[root_b] = root_a;
            self.rank[root_a] += 1;
        }
        true
    }

    /// Groups all elements by their representative. Within each component,
    /// elements keep their construction order.
    pub fn components(&mut self) -> Vec<Vec<T>> {
        let mut by_root: HashMap<usize, Vec<T>> = HashMap::new();
        for id in 0..self.elements.len() {
            let root = self.find_id(id);
            by_root.entry(root).or_default().push(self.elements[id].clone());
        }
        by_root.into_values().collect()
    }
}
