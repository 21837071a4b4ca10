pub mod attr;
pub mod id;
pub mod value;

pub use attr::{labels_of, primary_label, AttrMap, LABELS_ATTR};
pub use id::{EdgeKey, EdgeSlot, NodeId};
pub use value::{compare_values, is_order_null, sort_cmp, values_equal, Value};
