pub mod blacklist;
pub mod event;
pub mod filter;
pub mod info;
pub mod tag;

pub use blacklist::{Blacklist, BlacklistFilter};
pub use event::{Event, MAX_U16, MAX_U32};
pub use filter::{Filter, Subscription, TagMap};
pub use info::{RelayInformationDocument, RelayLimitationDocument};
pub use tag::{Tag, Tags};
