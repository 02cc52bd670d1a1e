/// `for`-loop sugar over a [`Generator`][crate::Generator], usable inside a
/// task (or generator) body only, since each step of the iteration is an
/// `.await` point.
///
/// The pattern binds a shared reference to the current element; the element
/// itself dies when the iteration moves past it.
///
/// # Usage
///
/// > `co_for!(<pattern> in <generator expression> => { <body> });`
///
/// # Example
///
/// ```rust
/// use ::recoro::prelude::*;
///
/// fn squares (up_to: u32)
///   -> Generator<u32>
/// {
///     Generator::new(move |co| async move {
///         for n in 1 ..= up_to {
///             co.yield_(n * n).await;
///         }
///     })
/// }
///
/// let mut task = Task::new(async {
///     let mut sum = 0;
///     co_for!(square in squares(4) => {
///         sum += *square;
///     });
///     sum
/// });
/// assert_eq!(*task.get(), 1 + 4 + 9 + 16);
/// ```
#[macro_export]
macro_rules! co_for {
    (
        $pat:pat in $generator:expr => $body:block
    ) => ({
        let mut iter = $crate::Generator::begin($generator).await;
        while !iter.is_done() {
            {
                let element = iter.get();
                let $pat = &*element;
                $body
            }
            iter.advance().await;
        }
    });
}
