//! Type descriptors and heap payload types.

pub(crate) mod bytes;
pub(crate) mod class;
pub(crate) mod descr;
pub(crate) mod dict;
pub(crate) mod list;
pub(crate) mod long_int;
pub(crate) mod module;
pub(crate) mod slice;
pub(crate) mod str;
pub(crate) mod tuple;
pub(crate) mod r#type;

pub(crate) use bytes::Bytes;
pub(crate) use class::{ClassObject, Instance, SubclassEntry, compute_c3_mro};
pub(crate) use descr::{BoundMethod, ClassMethod, MappingProxy, MemberDescriptor, Property, StaticMethod};
pub(crate) use dict::{Dict, DictCursor};
pub(crate) use list::List;
pub(crate) use long_int::LongInt;
pub(crate) use module::Module;
pub(crate) use slice::Slice;
pub(crate) use str::Str;
pub(crate) use tuple::{Tuple, allocate_tuple};
pub use r#type::Type;
