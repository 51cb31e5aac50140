//! Strongly-connected components (Tarjan).
//!
//! Nodes are `0..n` and `adjacency[v]` lists the successors of `v`. The
//! components come out in the order Tarjan discovers them, which is a reverse
//! topological order of the condensed graph. Members of each component are
//! sorted by node index.

/// Compute the strongly-connected components of a directed graph.
pub fn strongly_connected(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut state = Tarjan::new(adjacency.len());
    for v in 0..adjacency.len() {
        if state.index[v].is_none() {
            state.visit(v, adjacency);
        }
    }
    state.components
}

struct Tarjan {
    next_index: usize,
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl Tarjan {
    fn new(n: usize) -> Self {
        Self {
            next_index: 0,
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::with_capacity(n),
            components: Vec::new(),
        }
    }

    /// Depth-first search from `root` using an explicit stack of
    /// `(node, next edge)` frames, so long chains cannot overflow the call stack.
    fn visit(&mut self, root: usize, adjacency: &[Vec<usize>]) {
        let mut frames = vec![(root, 0usize)];
        self.open(root);

        while let Some(frame) = frames.last_mut() {
            let (v, edge) = *frame;
            if let Some(&w) = adjacency[v].get(edge) {
                frame.1 += 1;
                match self.index[w] {
                    None => {
                        self.open(w);
                        frames.push((w, 0));
                    }
                    Some(w_index) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[v]);
            }
            if Some(self.lowlink[v]) == self.index[v] {
                self.close(v);
            }
        }
    }

    fn open(&mut self, v: usize) {
        self.index[v] = Some(self.next_index);
        self.lowlink[v] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }

    /// Pop the component rooted at `v`.
    fn close(&mut self, v: usize) {
        let mut component = Vec::new();
        while let Some(w) = self.stack.pop() {
            self.on_stack[w] = false;
            component.push(w);
            if w == v {
                break;
            }
        }
        component.sort_unstable();
        self.components.push(component);
    }
}
