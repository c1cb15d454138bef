pub mod encoding;
pub mod entities;
pub mod field;
pub mod record;

pub use field::{FieldType, FieldValue};
pub use record::{
    EntityDescriptor, EntityKind, Mapped, MapperOptions, NormalizedRecord, RawRow, RecordMapper,
    Survivorship,
};
