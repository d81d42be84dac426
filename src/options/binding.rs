/// Two copies of one value: the bound outer field and the option source's own.
///
/// A write on either side is forwarded to the other only when it actually differs,
/// so a watcher on each side cannot bounce the same value back and forth.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldBinding<T> {
    outer: T,
    inner: T,
}

impl<T: Clone + PartialEq> FieldBinding<T> {
    pub fn new(initial: T) -> Self {
        Self {
            outer: initial.clone(),
            inner: initial,
        }
    }

    pub fn outer(&self) -> &T {
        &self.outer
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// The outer field changed. Returns the value the inner side must take, if any.
    pub fn push_outer(&mut self, value: T) -> Option<T> {
        self.outer = value;
        if self.inner == self.outer {
            return None;
        }
        self.inner = self.outer.clone();
        Some(self.inner.clone())
    }

    /// The inner value changed. Returns the value the outer field must take, if any.
    pub fn push_inner(&mut self, value: T) -> Option<T> {
        self.inner = value;
        if self.outer == self.inner {
            return None;
        }
        self.outer = self.inner.clone();
        Some(self.outer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changes_cross_once() {
        let mut b = FieldBinding::new(None::<String>);
        assert_eq!(b.push_outer(Some("manga".to_string())), Some(Some("manga".to_string())));
        assert_eq!(b.inner().as_deref(), Some("manga"));

        // The inner watcher echoes the same value back: nothing more happens.
        assert_eq!(b.push_inner(Some("manga".to_string())), None);
        assert_eq!(b.outer().as_deref(), Some("manga"));
    }

    #[test]
    fn test_inner_edit_reaches_outer() {
        let mut b = FieldBinding::new(1);
        assert_eq!(b.push_inner(2), Some(2));
        assert_eq!(*b.outer(), 2);
        assert_eq!(b.push_outer(2), None);
    }

    #[test]
    fn test_ping_pong_settles() {
        let mut b = FieldBinding::new(0);
        let mut forwarded = b.push_outer(5);
        let mut hops = 0;
        let mut outward = false;
        while let Some(v) = forwarded {
            hops += 1;
            forwarded = if outward { b.push_outer(v) } else { b.push_inner(v) };
            outward = !outward;
        }
        assert_eq!(hops, 1);
        assert_eq!((*b.outer(), *b.inner()), (5, 5));
    }
}
