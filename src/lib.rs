//! Package implement queryable views over hierarchical array containers.
//!
//! A container holds groups, datasets and attributes. On top of that this
//! package layers three subsystems,
//!
//! * [query], predicate trees over data elements, attribute values,
//!   attribute names and link names, with AND/OR combinators,
//!   serialization and evaluation.
//! * [reference], typed handles to objects, sub-array regions and named
//!   attributes, within one container or across containers, with a
//!   stable wire encoding and heap backed compat encodings.
//! * [index], a plug-in framework that accelerates element predicates on
//!   datasets, shipping a full-copy baseline plug-in and a binned
//!   roaring-bitmap plug-in whose persistent state lives in anonymous
//!   datasets inside the container.
//!
//! Applying a query to a location produces a result group of region,
//! object and attribute references, refer to [query::View].

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways,
///
/// ```ignore
/// use crate::Error;
/// err_at!(DecodeFail, msg: "invalid type byte {}", t)
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, std::fs::read(file))
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, std::fs::read(file), "reading {:?}", file)
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

/// Short form to guard decoders against truncated input.
#[macro_export]
macro_rules! check_remaining {
    ($buf:expr, $want:expr, $msg:expr) => {
        if $buf.len() < $want {
            err_at!(
                DecodeFail, msg: "insufficient input {}/{} ({})", $buf.len(), $want, $msg
            )
        } else {
            Ok(())
        }
    };
}

pub mod codec;
pub mod dtype;
pub mod index;
pub mod query;
pub mod reference;
pub mod space;
pub mod store;
pub mod transport;
pub mod util;

pub use crate::dtype::Dtype;
pub use crate::query::{CombineOp, MatchOp, Qref, Qtype, Query};
pub use crate::reference::Ref;
pub use crate::space::{Dataspace, Selection};
pub use crate::store::{Addr, Container, Ffile};

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that are returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the
/// error location, and a message.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Fatal(String, String),
    InvalidInput(String, String),
    BadType(String, String),
    NotFound(String, String),
    CantCreate(String, String),
    CantOpen(String, String),
    CantClose(String, String),
    EncodeFail(String, String),
    DecodeFail(String, String),
    CantCompare(String, String),
    CantConvert(String, String),
    Unsupported(String, String),
    InvalidFile(String, String),
    FailConvert(String, String),
    FailCbor(String, String),
    IOError(String, String),
    ThreadFail(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            InvalidInput(p, msg) => write!(f, "{} InvalidInput: {}", p, msg),
            BadType(p, msg) => write!(f, "{} BadType: {}", p, msg),
            NotFound(p, msg) => write!(f, "{} NotFound: {}", p, msg),
            CantCreate(p, msg) => write!(f, "{} CantCreate: {}", p, msg),
            CantOpen(p, msg) => write!(f, "{} CantOpen: {}", p, msg),
            CantClose(p, msg) => write!(f, "{} CantClose: {}", p, msg),
            EncodeFail(p, msg) => write!(f, "{} EncodeFail: {}", p, msg),
            DecodeFail(p, msg) => write!(f, "{} DecodeFail: {}", p, msg),
            CantCompare(p, msg) => write!(f, "{} CantCompare: {}", p, msg),
            CantConvert(p, msg) => write!(f, "{} CantConvert: {}", p, msg),
            Unsupported(p, msg) => write!(f, "{} Unsupported: {}", p, msg),
            InvalidFile(p, msg) => write!(f, "{} InvalidFile: {}", p, msg),
            FailConvert(p, msg) => write!(f, "{} FailConvert: {}", p, msg),
            FailCbor(p, msg) => write!(f, "{} FailCbor: {}", p, msg),
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            ThreadFail(p, msg) => write!(f, "{} ThreadFail: {}", p, msg),
        }
    }
}

impl error::Error for Error {}

/// Tear down process wide state, the plug-in registry, the bitmap engine
/// columns and the location registry. Mostly useful for embedders that
/// want a clean slate.
pub fn fini() -> Result<()> {
    index::unregister_all()?;
    index::engine::drop_columns()?;
    store::drop_locations()
}
