use_prelude!();

/// `Cell<Option<T>>` with `Option`-flavored accessors: the single-owner,
/// interiorly mutable slot through which a task's result travels from the
/// frame that produces it to the handle that extracts it.
pub(in crate)
struct CellOption<T> /* = */ {
    value: Cell<Option<T>>,
}

impl<T> CellOption<T> {
    /// An empty slot.
    pub(in crate)
    const
    fn none ()
      -> Self
    {
        Self { value: Cell::new(None) }
    }

    /// `Cell::replace(self, Some(value))`
    pub(in crate)
    fn set (self: &'_ Self, value: T)
      -> Option<T>
    {
        self.value.replace(Some(value))
    }

    /// `Cell::replace(self, None)`
    pub(in crate)
    fn take (self: &'_ Self)
      -> Option<T>
    {
        self.value.take()
    }

    /// Returns `true` if and only if the slot contains a value.
    pub(in crate)
    fn is_some (self: &'_ Self)
      -> bool
    {
        let value = self.value.take();
        let is_some = value.is_some();
        self.value.set(value);
        is_some
    }
}

impl<T> Default for CellOption<T> {
    #[inline]
    fn default ()
      -> Self
    {
        Self::none()
    }
}
