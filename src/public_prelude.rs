//! Single import to get going: `use ::recoro::prelude::*;`

#[doc(no_inline)]
pub
use crate::{
    co_for,
    progress,
    Co,
    GenIter,
    Generator,
    Task,
};
