/// A value paired with the parameters an operation on it needs, so that the
/// operation can be written as a method of the pair.
///
/// The voxel map uses it to push points into a voxel's slots under the
/// insertion parameters of the current call.
pub struct Contextual<T, C> {
    pub inner: T,
    pub context: C,
}

pub trait WithContext<C>: Sized {
    fn with_context(self, context: C) -> Contextual<Self, C>;
}

impl<T, C> WithContext<C> for T {
    #[inline]
    fn with_context(self, context: C) -> Contextual<Self, C> {
        Contextual {
            inner: self,
            context,
        }
    }
}
