#[macro_use]
mod macros;

mod cell_option;

pub(in crate)
mod prelude;

pub(in crate)
use self::cell_option::CellOption;
