pub mod camt054;
pub mod reference;

pub use camt054::{
    parse, CamtEntry, CamtError, CamtNotification, CamtTransactionDetail,
};
pub use reference::ReferenceExtractor;
