//! Main DataForge parser/reader

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::binary::BinaryCursor;
use crate::dataforge::definitions::*;
use crate::dataforge::header::DataForgeHeader;
use crate::dataforge::instance::{Field, Instance, Value};
use crate::dataforge::types::*;
use crate::error::{Error, Result};

/// Nesting limit for inline structs inside one instance
const MAX_INLINE_DEPTH: u32 = 32;

/// A top-level record: a named, GUID-addressed struct instance
#[derive(Debug, Clone)]
pub struct Record {
    pub id: Guid,
    /// Full record name, e.g. `EntityClassDefinition.AEGS_Avenger_Titan`
    pub name: String,
    /// Source path of the record inside the game's data tree
    pub file_name: String,
    pub struct_index: u32,
    pub instance_index: u32,
}

impl Record {
    /// Record name without the struct-name prefix
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn instance_ref(&self) -> InstanceRef {
        InstanceRef {
            struct_index: self.struct_index,
            instance_index: self.instance_index,
        }
    }
}

/// One field of a struct's flattened layout
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: Arc<str>,
    pub data_type: DataType,
    pub conversion: ConversionType,
    /// Struct index for class and pointer fields, enum index for enums
    pub target: u16,
    /// Inline width, `None` when it cannot be determined
    pub width: Option<u32>,
}

/// A struct with its inheritance chain flattened, parent fields first
#[derive(Debug, Clone)]
pub struct StructSchema {
    pub name: Arc<str>,
    pub parent: Option<u32>,
    pub record_size: u32,
    pub fields: Vec<FieldSchema>,
    /// Absolute offset of this struct's instance block
    data_offset: Option<usize>,
    instance_count: u32,
}

impl StructSchema {
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }
}

/// A named enumeration and its options
#[derive(Debug, Clone)]
pub struct EnumSchema {
    pub name: String,
    pub options: Vec<String>,
}

/// Absolute offsets of the value pools, text tables and data section
#[derive(Debug, Clone, Default)]
struct Layout {
    int8: usize,
    int16: usize,
    int32: usize,
    int64: usize,
    uint8: usize,
    uint16: usize,
    uint32: usize,
    uint64: usize,
    boolean: usize,
    single: usize,
    double: usize,
    guid: usize,
    string: usize,
    locale: usize,
    enums: usize,
    strong: usize,
    weak: usize,
    reference: usize,
    enum_option: usize,
    text: usize,
    blob: usize,
    data: usize,
}

/// Main DataForge reader structure
pub struct DataForge {
    data: Vec<u8>,
    pub header: DataForgeHeader,
    layout: Layout,
    structs: Vec<StructSchema>,
    enums: Vec<EnumSchema>,
    /// Sorted by id
    records: Vec<Record>,
    path_to_record: HashMap<String, usize>,
    struct_by_name: HashMap<Arc<str>, u32>,
    unknown_fields: Vec<Error>,
}

impl DataForge {
    /// Check if data is a DataForge/DCB file
    pub fn is_dataforge(data: &[u8]) -> bool {
        if data.len() < 8 {
            return false;
        }
        let version = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        (1..=10).contains(&version)
    }

    /// Parse DataForge data.
    ///
    /// Phases run in order because each one reads pools the previous built:
    /// header, struct schemas, enums, string tables, then the record table.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = DataForgeHeader::parse(data)?;
        let legacy = header.is_legacy;

        let mapping_size = if header.file_version >= 5 {
            DataMapping::RECORD_SIZE_V6
        } else {
            DataMapping::RECORD_SIZE_LEGACY
        };
        let record_size = if legacy {
            RecordDefinition::RECORD_SIZE_LEGACY
        } else {
            RecordDefinition::RECORD_SIZE
        };

        let struct_offset = header.header_size();
        let property_offset =
            struct_offset + header.struct_definition_count as usize * StructDefinition::RECORD_SIZE;
        let enum_offset = property_offset
            + header.property_definition_count as usize * PropertyDefinition::RECORD_SIZE;
        let mapping_offset =
            enum_offset + header.enum_definition_count as usize * EnumDefinition::RECORD_SIZE;
        let record_offset = mapping_offset + header.data_mapping_count as usize * mapping_size;

        let v = &header.values;
        let mut layout = Layout::default();
        layout.int8 = record_offset + header.record_definition_count as usize * record_size;
        layout.int16 = layout.int8 + v.int8 as usize;
        layout.int32 = layout.int16 + v.int16 as usize * 2;
        layout.int64 = layout.int32 + v.int32 as usize * 4;
        layout.uint8 = layout.int64 + v.int64 as usize * 8;
        layout.uint16 = layout.uint8 + v.uint8 as usize;
        layout.uint32 = layout.uint16 + v.uint16 as usize * 2;
        layout.uint64 = layout.uint32 + v.uint32 as usize * 4;
        layout.boolean = layout.uint64 + v.uint64 as usize * 8;
        layout.single = layout.boolean + v.boolean as usize;
        layout.double = layout.single + v.single as usize * 4;
        layout.guid = layout.double + v.double as usize * 8;
        layout.string = layout.guid + v.guid as usize * 16;
        layout.locale = layout.string + v.string as usize * 4;
        layout.enums = layout.locale + v.locale as usize * 4;
        layout.strong = layout.enums + v.enums as usize * 4;
        layout.weak = layout.strong + v.strong as usize * 8;
        layout.reference = layout.weak + v.weak as usize * 8;
        layout.enum_option = layout.reference + v.reference as usize * 20;
        layout.text = layout.enum_option + v.enum_option as usize * 4;
        layout.blob = layout.text + header.text_length as usize;
        layout.data = layout.blob + header.blob_length as usize;

        if layout.data > data.len() {
            return Err(Error::InvalidDataForge(format!(
                "tables end at {} but file is {} bytes",
                layout.data,
                data.len()
            )));
        }

        let mut df = DataForge {
            data: data.to_vec(),
            header,
            layout,
            structs: Vec::new(),
            enums: Vec::new(),
            records: Vec::new(),
            path_to_record: HashMap::new(),
            struct_by_name: HashMap::new(),
            unknown_fields: Vec::new(),
        };

        let mut cursor = BinaryCursor::at(&df.data, struct_offset)?;
        let struct_defs = (0..df.header.struct_definition_count)
            .map(|_| StructDefinition::read(&mut cursor))
            .collect::<Result<Vec<_>>>()?;
        let property_defs = (0..df.header.property_definition_count)
            .map(|_| PropertyDefinition::read(&mut cursor))
            .collect::<Result<Vec<_>>>()?;
        let enum_defs = (0..df.header.enum_definition_count)
            .map(|_| EnumDefinition::read(&mut cursor))
            .collect::<Result<Vec<_>>>()?;
        let wide = mapping_size == DataMapping::RECORD_SIZE_V6;
        let mappings = (0..df.header.data_mapping_count)
            .map(|_| DataMapping::read(&mut cursor, wide))
            .collect::<Result<Vec<_>>>()?;
        let record_defs = (0..df.header.record_definition_count)
            .map(|_| RecordDefinition::read(&mut cursor, legacy))
            .collect::<Result<Vec<_>>>()?;

        df.build_schemas(&struct_defs, &property_defs, &mappings)?;
        df.build_enums(&enum_defs)?;
        df.build_records(&record_defs)?;

        debug!(
            structs = df.structs.len(),
            enums = df.enums.len(),
            records = df.records.len(),
            unknown_fields = df.unknown_fields.len(),
            "DataForge loaded"
        );
        Ok(df)
    }

    fn build_schemas(
        &mut self,
        struct_defs: &[StructDefinition],
        property_defs: &[PropertyDefinition],
        mappings: &[DataMapping],
    ) -> Result<()> {
        let mut schemas = Vec::with_capacity(struct_defs.len());
        for (index, def) in struct_defs.iter().enumerate() {
            let name: Arc<str> = Arc::from(self.read_blob(def.name_offset)?);

            // Walk up to the root, then lay fields out parent-first
            let mut chain = vec![index];
            let mut current = def.parent();
            while let Some(parent) = current {
                if parent >= struct_defs.len() || chain.len() > struct_defs.len() {
                    return Err(Error::InvalidDataForge(format!(
                        "struct {} has a broken parent chain",
                        name
                    )));
                }
                chain.push(parent);
                current = struct_defs[parent].parent();
            }
            chain.reverse();

            let mut fields = Vec::new();
            for &owner in &chain {
                let owner_def = &struct_defs[owner];
                let first = owner_def.first_property_index as usize;
                let last = first + owner_def.property_count as usize;
                let props = property_defs.get(first..last).ok_or_else(|| {
                    Error::InvalidDataForge(format!("struct {} property range out of bounds", name))
                })?;
                for prop in props {
                    let width = if prop.conversion_type.is_array() {
                        Some(ARRAY_SLOT_SIZE)
                    } else if prop.data_type == DataType::Class {
                        struct_defs.get(prop.index as usize).map(|s| s.record_size)
                    } else {
                        prop.data_type.inline_size()
                    };
                    fields.push(FieldSchema {
                        name: Arc::from(self.read_blob(prop.name_offset)?),
                        data_type: prop.data_type,
                        conversion: prop.conversion_type,
                        target: prop.index,
                        width,
                    });
                }
            }

            self.infer_unknown_width(&name, def.record_size, &mut fields);

            schemas.push(StructSchema {
                name,
                parent: def.parent().map(|p| p as u32),
                record_size: def.record_size,
                fields,
                data_offset: None,
                instance_count: 0,
            });
        }

        // Instance blocks follow each other in mapping order
        let mut offset = self.layout.data;
        for mapping in mappings {
            let Some(schema) = schemas.get_mut(mapping.struct_index as usize) else {
                return Err(Error::InvalidDataForge(format!(
                    "data mapping names missing struct {}",
                    mapping.struct_index
                )));
            };
            if schema.data_offset.is_none() {
                schema.data_offset = Some(offset);
                schema.instance_count = mapping.struct_count;
            }
            offset += mapping.struct_count as usize * schema.record_size as usize;
        }

        self.struct_by_name = schemas
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i as u32))
            .collect();
        self.structs = schemas;
        Ok(())
    }

    /// An unknown attribute can still be skipped when it is the only field of
    /// unknown width: it occupies whatever the known fields leave over.
    fn infer_unknown_width(&mut self, struct_name: &str, record_size: u32, fields: &mut [FieldSchema]) {
        let unknown: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.width.is_none())
            .map(|(i, _)| i)
            .collect();

        for &i in &unknown {
            let field = &fields[i];
            let err = Error::UnknownStructField {
                struct_name: struct_name.to_string(),
                field: field.name.to_string(),
                tag: field.data_type.to_u16(),
            };
            warn!("{}", err);
            self.unknown_fields.push(err);
        }

        if let [only] = unknown.as_slice() {
            let known: u32 = fields.iter().filter_map(|f| f.width).sum();
            if let Some(rest) = record_size.checked_sub(known) {
                fields[*only].width = Some(rest);
            }
        }
    }

    fn build_enums(&mut self, enum_defs: &[EnumDefinition]) -> Result<()> {
        let mut enums = Vec::with_capacity(enum_defs.len());
        for def in enum_defs {
            let mut options = Vec::with_capacity(def.value_count as usize);
            for i in 0..def.value_count as usize {
                let index = def.first_value_index as usize + i;
                let offset = self.pool_u32(self.layout.enum_option, index)?;
                options.push(self.read_blob(offset)?);
            }
            enums.push(EnumSchema {
                name: self.read_blob(def.name_offset)?,
                options,
            });
        }
        self.enums = enums;
        Ok(())
    }

    fn build_records(&mut self, record_defs: &[RecordDefinition]) -> Result<()> {
        let mut records = Vec::with_capacity(record_defs.len());
        for def in record_defs {
            records.push(Record {
                id: def.id,
                name: self.read_blob(def.name_offset)?,
                file_name: if self.header.is_legacy {
                    String::new()
                } else {
                    self.read_text(def.file_name_offset)?
                },
                struct_index: def.struct_index,
                instance_index: def.variant_index as u32,
            });
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));

        self.path_to_record = records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.file_name.is_empty())
            .map(|(i, r)| (normalize_path(&r.file_name), i))
            .collect();
        self.records = records;
        Ok(())
    }

    pub fn read_text(&self, offset: u32) -> Result<String> {
        self.read_table_string(self.layout.text, self.layout.blob, offset)
    }

    /// Names of structs, properties, enums and records
    pub fn read_blob(&self, offset: u32) -> Result<String> {
        if self.header.file_version < 6 {
            self.read_text(offset)
        } else {
            self.read_table_string(self.layout.blob, self.layout.data, offset)
        }
    }

    fn read_table_string(&self, start: usize, end: usize, offset: u32) -> Result<String> {
        let at = start + offset as usize;
        if at >= end {
            return Err(Error::InvalidDataForge(format!(
                "string offset {} outside its table",
                offset
            )));
        }
        BinaryCursor::new(&self.data[..end]).cstring_at(at)
    }

    fn pool_u32(&self, pool: usize, index: usize) -> Result<u32> {
        BinaryCursor::at(&self.data, pool + index * 4)?.u32()
    }

    // Accessors

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Binary search on the sorted record table
    pub fn record(&self, id: &Guid) -> Option<&Record> {
        self.records
            .binary_search_by(|r| r.id.cmp(id))
            .ok()
            .map(|i| &self.records[i])
    }

    /// Look a record up by its source path; case and separators are ignored
    pub fn record_by_path(&self, path: &str) -> Option<&Record> {
        self.path_to_record
            .get(&normalize_path(path))
            .map(|&i| &self.records[i])
    }

    pub fn record_paths(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|r| !r.file_name.is_empty())
            .map(|r| r.file_name.as_str())
    }

    pub fn structs(&self) -> &[StructSchema] {
        &self.structs
    }

    pub fn struct_schema(&self, index: u32) -> Result<&StructSchema> {
        self.structs
            .get(index as usize)
            .ok_or_else(|| Error::InvalidDataForge(format!("struct index {} out of range", index)))
    }

    pub fn struct_index(&self, name: &str) -> Option<u32> {
        self.struct_by_name.get(name).copied()
    }

    pub fn struct_name(&self, index: u32) -> Option<&str> {
        self.structs.get(index as usize).map(|s| s.name.as_ref())
    }

    /// Whether `index` is `base` or inherits from it
    pub fn inherits_from(&self, index: u32, base: &str) -> bool {
        let mut current = Some(index);
        let mut steps = 0;
        while let Some(i) = current {
            let Some(schema) = self.structs.get(i as usize) else {
                return false;
            };
            if schema.name.as_ref() == base {
                return true;
            }
            steps += 1;
            if steps > self.structs.len() {
                return false;
            }
            current = schema.parent;
        }
        false
    }

    pub fn enums(&self) -> &[EnumSchema] {
        &self.enums
    }

    /// Fields skipped because their type tag is unknown
    pub fn unknown_fields(&self) -> &[Error] {
        &self.unknown_fields
    }

    // Instance decoding

    /// Decode one instance of a struct from the data section
    pub fn instance(&self, at: InstanceRef) -> Result<Instance> {
        self.instance_at(at.struct_index, at.instance_index, 0)
    }

    pub fn record_instance(&self, record: &Record) -> Result<Instance> {
        self.instance(record.instance_ref())
    }

    fn instance_at(&self, struct_index: u32, instance_index: u32, depth: u32) -> Result<Instance> {
        let schema = self.struct_schema(struct_index)?;
        let base = schema.data_offset.ok_or_else(|| {
            Error::InvalidDataForge(format!("struct {} has no instances", schema.name))
        })?;
        if instance_index >= schema.instance_count {
            return Err(Error::InvalidDataForge(format!(
                "{}[{}] out of range ({} instances)",
                schema.name, instance_index, schema.instance_count
            )));
        }
        let offset = base + instance_index as usize * schema.record_size as usize;
        let mut cursor = BinaryCursor::at(&self.data, offset)?;
        self.decode_struct(&mut cursor, struct_index, depth)
    }

    fn decode_struct(
        &self,
        cursor: &mut BinaryCursor<'_>,
        struct_index: u32,
        depth: u32,
    ) -> Result<Instance> {
        if depth > MAX_INLINE_DEPTH {
            return Err(Error::InvalidDataForge(format!(
                "inline struct nesting deeper than {}",
                MAX_INLINE_DEPTH
            )));
        }
        let schema = self.struct_schema(struct_index)?;

        let mut fields = Vec::with_capacity(schema.fields.len());
        let mut lost = false;
        for field in &schema.fields {
            let value = if lost {
                Value::Unparsed(field.data_type.to_u16())
            } else if field.conversion.is_array() {
                let count = cursor.u32()?;
                let first = cursor.u32()?;
                self.decode_array(field, count, first, depth)?
            } else {
                match (field.data_type, field.width) {
                    (DataType::Unknown(tag), Some(width)) => {
                        cursor.skip(width as usize)?;
                        Value::Unparsed(tag)
                    }
                    (DataType::Unknown(tag), None) => {
                        // Nothing after this field can be located
                        lost = true;
                        Value::Unparsed(tag)
                    }
                    (DataType::Class, width) => {
                        let start = cursor.position();
                        let nested = self.decode_struct(cursor, field.target as u32, depth + 1)?;
                        if let Some(width) = width {
                            cursor.seek(start + width as usize)?;
                        }
                        Value::Class(Box::new(nested))
                    }
                    (data_type, _) => self.decode_attribute(cursor, data_type)?,
                }
            };
            fields.push(Field {
                name: field.name.clone(),
                value,
            });
        }

        Ok(Instance {
            struct_index,
            type_name: schema.name.clone(),
            fields,
        })
    }

    fn decode_attribute(&self, cursor: &mut BinaryCursor<'_>, data_type: DataType) -> Result<Value> {
        Ok(match data_type {
            DataType::Boolean => Value::Bool(cursor.bool()?),
            DataType::Int8 => Value::Int(cursor.i8()? as i64),
            DataType::Int16 => Value::Int(cursor.i16()? as i64),
            DataType::Int32 => Value::Int(cursor.i32()? as i64),
            DataType::Int64 => Value::Int(cursor.i64()?),
            DataType::UInt8 => Value::UInt(cursor.u8()? as u64),
            DataType::UInt16 => Value::UInt(cursor.u16()? as u64),
            DataType::UInt32 => Value::UInt(cursor.u32()? as u64),
            DataType::UInt64 => Value::UInt(cursor.u64()?),
            DataType::Single => Value::Float(cursor.f32()? as f64),
            DataType::Double => Value::Float(cursor.f64()?),
            DataType::Guid => Value::Guid(cursor.guid()?),
            DataType::String => Value::String(self.read_text(cursor.u32()?)?),
            DataType::Locale => Value::Locale(self.read_text(cursor.u32()?)?),
            DataType::Enum => Value::Enum(self.read_text(cursor.u32()?)?),
            DataType::Reference => {
                let _item1 = cursor.u32()?;
                let guid = cursor.guid()?;
                Value::Reference((!guid.is_empty()).then_some(guid))
            }
            DataType::StrongPointer => Value::StrongPointer(read_pointer(cursor)?),
            DataType::WeakPointer => Value::WeakPointer(read_pointer(cursor)?),
            DataType::Class | DataType::Unknown(_) => Value::Unparsed(data_type.to_u16()),
        })
    }

    fn decode_array(&self, field: &FieldSchema, count: u32, first: u32, depth: u32) -> Result<Value> {
        let v = &self.header.values;
        let (pool, len) = match field.data_type {
            DataType::Boolean => (self.layout.boolean, v.boolean),
            DataType::Int8 => (self.layout.int8, v.int8),
            DataType::Int16 => (self.layout.int16, v.int16),
            DataType::Int32 => (self.layout.int32, v.int32),
            DataType::Int64 => (self.layout.int64, v.int64),
            DataType::UInt8 => (self.layout.uint8, v.uint8),
            DataType::UInt16 => (self.layout.uint16, v.uint16),
            DataType::UInt32 => (self.layout.uint32, v.uint32),
            DataType::UInt64 => (self.layout.uint64, v.uint64),
            DataType::Single => (self.layout.single, v.single),
            DataType::Double => (self.layout.double, v.double),
            DataType::Guid => (self.layout.guid, v.guid),
            DataType::String => (self.layout.string, v.string),
            DataType::Locale => (self.layout.locale, v.locale),
            DataType::Enum => (self.layout.enums, v.enums),
            DataType::StrongPointer => (self.layout.strong, v.strong),
            DataType::WeakPointer => (self.layout.weak, v.weak),
            DataType::Reference => (self.layout.reference, v.reference),
            DataType::Class => {
                let schema = self.struct_schema(field.target as u32)?;
                if first as u64 + count as u64 > schema.instance_count as u64 {
                    return Err(Error::InvalidDataForge(format!(
                        "{}[{}..{}] out of range ({} instances)",
                        schema.name,
                        first,
                        first as u64 + count as u64,
                        schema.instance_count
                    )));
                }
                let items = (first..first + count)
                    .map(|i| {
                        self.instance_at(field.target as u32, i, depth + 1)
                            .map(|inst| Value::Class(Box::new(inst)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Value::Array(items));
            }
            DataType::Unknown(tag) => return Ok(Value::Unparsed(tag)),
        };

        let width = field.data_type.inline_size().unwrap_or(0) as usize;
        if first as u64 + count as u64 > len as u64 {
            return Err(Error::UnexpectedEof {
                offset: pool + first as usize * width,
                wanted: count as usize * width,
                available: (len as usize).saturating_sub(first as usize) * width,
            });
        }
        let mut items = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let mut cursor = BinaryCursor::at(&self.data, pool + (first as usize + i) * width)?;
            items.push(self.decode_attribute(&mut cursor, field.data_type)?);
        }
        Ok(Value::Array(items))
    }
}

fn read_pointer(cursor: &mut BinaryCursor<'_>) -> Result<Option<InstanceRef>> {
    let struct_index = cursor.u32()?;
    let instance_index = cursor.u16()?;
    let _padding = cursor.u16()?;
    Ok(InstanceRef::from_pointer(struct_index, instance_index))
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}
