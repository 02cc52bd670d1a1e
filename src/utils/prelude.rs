pub(in crate)
use ::std::{
    any::Any,
    cell::{Cell, Ref, RefCell},
    future::Future,
    panic,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};

pub(in crate)
use ::log::{debug, trace};

pub(in crate)
use crate::utils::CellOption;
