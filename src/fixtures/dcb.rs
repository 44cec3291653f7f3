//! Writer for small DataForge v6 databases

use std::collections::HashMap;

use crate::dataforge::{DataType, Guid, InstanceRef, ARRAY_SLOT_SIZE};

/// Field declaration for [`DcbBuilder::add_struct`]
#[derive(Debug, Clone)]
pub(crate) enum FieldKind {
    Attr(DataType),
    /// Inline struct
    Class(u32),
    Array(DataType),
    /// Array of instances of a struct
    ClassArray(u32),
    /// A type tag the reader does not know, with its inline width
    Unknown(u16, u32),
}

/// Value of one field of a fixture instance
#[derive(Debug, Clone)]
pub(crate) enum FixtureValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Guid(Guid),
    Reference(Option<Guid>),
    Pointer(Option<InstanceRef>),
    /// Nested inline struct values
    Inline(Vec<FixtureValue>),
    List(Vec<FixtureValue>),
    Ints(Vec<i64>),
    /// Contiguous instance indices of the array's struct
    Instances(Vec<u32>),
    Raw(Vec<u8>),
}

struct StructEntry {
    name: String,
    parent: Option<u32>,
    fields: Vec<(String, FieldKind)>,
    record_size: u32,
}

struct RecordEntry {
    name: String,
    file: String,
    struct_index: u32,
    instance: u32,
    id: Guid,
}

/// Deduplicating string table
#[derive(Default)]
struct StringTable {
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StringTable {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(s.to_string(), offset);
        offset
    }
}

/// Value pools in file order
#[derive(Default)]
struct Pools {
    int8: Vec<u8>,
    int16: Vec<u8>,
    int32: Vec<u8>,
    int64: Vec<u8>,
    uint8: Vec<u8>,
    uint16: Vec<u8>,
    uint32: Vec<u8>,
    uint64: Vec<u8>,
    boolean: Vec<u8>,
    single: Vec<u8>,
    double: Vec<u8>,
    guid: Vec<u8>,
    string: Vec<u8>,
    locale: Vec<u8>,
    enums: Vec<u8>,
    strong: Vec<u8>,
    weak: Vec<u8>,
    reference: Vec<u8>,
    enum_option: Vec<u8>,
}

impl Pools {
    fn pool_mut(&mut self, data_type: DataType) -> &mut Vec<u8> {
        match data_type {
            DataType::Boolean => &mut self.boolean,
            DataType::Int8 => &mut self.int8,
            DataType::Int16 => &mut self.int16,
            DataType::Int32 => &mut self.int32,
            DataType::Int64 => &mut self.int64,
            DataType::UInt8 => &mut self.uint8,
            DataType::UInt16 => &mut self.uint16,
            DataType::UInt32 => &mut self.uint32,
            DataType::UInt64 => &mut self.uint64,
            DataType::Single => &mut self.single,
            DataType::Double => &mut self.double,
            DataType::Guid => &mut self.guid,
            DataType::String => &mut self.string,
            DataType::Locale => &mut self.locale,
            DataType::Enum => &mut self.enums,
            DataType::StrongPointer => &mut self.strong,
            DataType::WeakPointer => &mut self.weak,
            DataType::Reference => &mut self.reference,
            other => panic!("no value pool for {:?}", other),
        }
    }
}

#[derive(Default)]
pub(crate) struct DcbBuilder {
    structs: Vec<StructEntry>,
    enums: Vec<(String, Vec<String>)>,
    instances: HashMap<u32, Vec<Vec<FixtureValue>>>,
    records: Vec<RecordEntry>,
}

impl DcbBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Declare a struct; returns its index. Referenced structs must already exist.
    pub(crate) fn add_struct(
        &mut self,
        name: &str,
        parent: Option<u32>,
        fields: Vec<(&str, FieldKind)>,
    ) -> u32 {
        let inherited = parent.map_or(0, |p| self.structs[p as usize].record_size);
        let own: u32 = fields.iter().map(|(_, kind)| self.width(kind)).sum();
        self.structs.push(StructEntry {
            name: name.to_string(),
            parent,
            fields: fields
                .into_iter()
                .map(|(n, k)| (n.to_string(), k))
                .collect(),
            record_size: inherited + own,
        });
        (self.structs.len() - 1) as u32
    }

    pub(crate) fn add_enum(&mut self, name: &str, options: &[&str]) {
        self.enums.push((
            name.to_string(),
            options.iter().map(|s| s.to_string()).collect(),
        ));
    }

    /// Values cover the flattened field list, parent fields first. Returns the instance index.
    pub(crate) fn add_instance(&mut self, struct_index: u32, values: Vec<FixtureValue>) -> u32 {
        let list = self.instances.entry(struct_index).or_default();
        list.push(values);
        (list.len() - 1) as u32
    }

    pub(crate) fn add_record(&mut self, name: &str, file: &str, struct_index: u32, instance: u32, id: Guid) {
        self.records.push(RecordEntry {
            name: name.to_string(),
            file: file.to_string(),
            struct_index,
            instance,
            id,
        });
    }

    fn width(&self, kind: &FieldKind) -> u32 {
        match kind {
            FieldKind::Attr(t) => t.inline_size().expect("attribute width"),
            FieldKind::Class(s) => self.structs[*s as usize].record_size,
            FieldKind::Array(_) | FieldKind::ClassArray(_) => ARRAY_SLOT_SIZE,
            FieldKind::Unknown(_, width) => *width,
        }
    }

    fn flattened(&self, struct_index: u32) -> Vec<&FieldKind> {
        let mut chain = vec![struct_index];
        while let Some(parent) = self.structs[*chain.last().unwrap() as usize].parent {
            chain.push(parent);
        }
        chain
            .iter()
            .rev()
            .flat_map(|&s| self.structs[s as usize].fields.iter().map(|(_, k)| k))
            .collect()
    }

    fn encode_struct(
        &self,
        struct_index: u32,
        values: &[FixtureValue],
        out: &mut Vec<u8>,
        pools: &mut Pools,
        text: &mut StringTable,
    ) {
        let kinds = self.flattened(struct_index);
        assert_eq!(
            kinds.len(),
            values.len(),
            "value count for {}",
            self.structs[struct_index as usize].name
        );
        for (kind, value) in kinds.into_iter().zip(values) {
            match (kind, value) {
                (FieldKind::Attr(t), v) => encode_scalar(*t, v, out, text),
                (FieldKind::Class(s), FixtureValue::Inline(inner)) => {
                    self.encode_struct(*s, inner, out, pools, text)
                }
                (FieldKind::Array(t), v) => {
                    let items: Vec<FixtureValue> = match v {
                        FixtureValue::List(items) => items.clone(),
                        FixtureValue::Ints(items) => {
                            items.iter().map(|&i| FixtureValue::Int(i)).collect()
                        }
                        other => panic!("array needs a list, got {:?}", other),
                    };
                    let width = t.inline_size().expect("array element width") as usize;
                    let pool = pools.pool_mut(*t);
                    let first = (pool.len() / width) as u32;
                    for item in &items {
                        encode_scalar(*t, item, pool, text);
                    }
                    out.extend_from_slice(&(items.len() as u32).to_le_bytes());
                    out.extend_from_slice(&first.to_le_bytes());
                }
                (FieldKind::ClassArray(_), FixtureValue::Instances(indices)) => {
                    for pair in indices.windows(2) {
                        assert_eq!(pair[0] + 1, pair[1], "class array indices must be contiguous");
                    }
                    let first = indices.first().copied().unwrap_or(0);
                    out.extend_from_slice(&(indices.len() as u32).to_le_bytes());
                    out.extend_from_slice(&first.to_le_bytes());
                }
                (FieldKind::Unknown(_, width), FixtureValue::Raw(bytes)) => {
                    assert_eq!(bytes.len(), *width as usize);
                    out.extend_from_slice(bytes);
                }
                (kind, value) => panic!("{:?} cannot hold {:?}", kind, value),
            }
        }
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut text = StringTable::default();
        let mut blob = StringTable::default();
        let mut pools = Pools::default();

        // Data section first so the pools and text table are complete
        let mut data = Vec::new();
        let mut mappings = Vec::new();
        for index in 0..self.structs.len() as u32 {
            let Some(list) = self.instances.get(&index) else {
                continue;
            };
            mappings.push((list.len() as u32, index));
            for values in list {
                let start = data.len();
                self.encode_struct(index, values, &mut data, &mut pools, &mut text);
                assert_eq!(
                    data.len() - start,
                    self.structs[index as usize].record_size as usize
                );
            }
        }

        let mut struct_table = Vec::new();
        let mut property_table = Vec::new();
        let mut property_count = 0u16;
        for entry in &self.structs {
            struct_table.extend_from_slice(&blob.intern(&entry.name).to_le_bytes());
            struct_table.extend_from_slice(&entry.parent.unwrap_or(0xFFFF_FFFF).to_le_bytes());
            struct_table.extend_from_slice(&(entry.fields.len() as u16).to_le_bytes());
            struct_table.extend_from_slice(&property_count.to_le_bytes());
            struct_table.extend_from_slice(&entry.record_size.to_le_bytes());

            for (name, kind) in &entry.fields {
                let (index, data_type, conversion) = match kind {
                    FieldKind::Attr(t) => (0u16, t.to_u16(), 0u16),
                    FieldKind::Class(s) => (*s as u16, DataType::Class.to_u16(), 0),
                    FieldKind::Array(t) => (0, t.to_u16(), 2),
                    FieldKind::ClassArray(s) => (*s as u16, DataType::Class.to_u16(), 3),
                    FieldKind::Unknown(tag, _) => (0, *tag, 0),
                };
                property_table.extend_from_slice(&blob.intern(name).to_le_bytes());
                property_table.extend_from_slice(&index.to_le_bytes());
                property_table.extend_from_slice(&data_type.to_le_bytes());
                property_table.extend_from_slice(&conversion.to_le_bytes());
                property_table.extend_from_slice(&0u16.to_le_bytes());
            }
            property_count += entry.fields.len() as u16;
        }

        let mut enum_table = Vec::new();
        for (name, options) in &self.enums {
            let first = (pools.enum_option.len() / 4) as u16;
            for option in options {
                let offset = blob.intern(option);
                pools.enum_option.extend_from_slice(&offset.to_le_bytes());
            }
            enum_table.extend_from_slice(&blob.intern(name).to_le_bytes());
            enum_table.extend_from_slice(&(options.len() as u16).to_le_bytes());
            enum_table.extend_from_slice(&first.to_le_bytes());
        }

        let mut mapping_table = Vec::new();
        for (count, index) in &mappings {
            mapping_table.extend_from_slice(&count.to_le_bytes());
            mapping_table.extend_from_slice(&index.to_le_bytes());
        }

        let mut record_table = Vec::new();
        for record in &self.records {
            record_table.extend_from_slice(&blob.intern(&record.name).to_le_bytes());
            record_table.extend_from_slice(&text.intern(&record.file).to_le_bytes());
            record_table.extend_from_slice(&record.struct_index.to_le_bytes());
            record_table.extend_from_slice(&record.id.to_wire());
            record_table.extend_from_slice(&(record.instance as u16).to_le_bytes());
            record_table.extend_from_slice(&0u16.to_le_bytes());
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&6i32.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        for count in [
            self.structs.len(),
            property_count as usize,
            self.enums.len(),
            mappings.len(),
            self.records.len(),
        ] {
            out.extend_from_slice(&(count as u32).to_le_bytes());
        }
        let p = &pools;
        for (bytes, width) in [
            (&p.boolean, 1),
            (&p.int8, 1),
            (&p.int16, 2),
            (&p.int32, 4),
            (&p.int64, 8),
            (&p.uint8, 1),
            (&p.uint16, 2),
            (&p.uint32, 4),
            (&p.uint64, 8),
            (&p.single, 4),
            (&p.double, 8),
            (&p.guid, 16),
            (&p.string, 4),
            (&p.locale, 4),
            (&p.enums, 4),
            (&p.strong, 8),
            (&p.weak, 8),
            (&p.reference, 20),
            (&p.enum_option, 4),
        ] {
            out.extend_from_slice(&((bytes.len() / width) as u32).to_le_bytes());
        }
        out.extend_from_slice(&(text.bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&(blob.bytes.len() as u32).to_le_bytes());
        assert_eq!(out.len(), crate::dataforge::HEADER_SIZE);

        out.extend_from_slice(&struct_table);
        out.extend_from_slice(&property_table);
        out.extend_from_slice(&enum_table);
        out.extend_from_slice(&mapping_table);
        out.extend_from_slice(&record_table);
        for pool in [
            &p.int8,
            &p.int16,
            &p.int32,
            &p.int64,
            &p.uint8,
            &p.uint16,
            &p.uint32,
            &p.uint64,
            &p.boolean,
            &p.single,
            &p.double,
            &p.guid,
            &p.string,
            &p.locale,
            &p.enums,
            &p.strong,
            &p.weak,
            &p.reference,
            &p.enum_option,
        ] {
            out.extend_from_slice(pool);
        }
        out.extend_from_slice(&text.bytes);
        out.extend_from_slice(&blob.bytes);
        out.extend_from_slice(&data);
        out
    }
}

fn encode_scalar(data_type: DataType, value: &FixtureValue, out: &mut Vec<u8>, text: &mut StringTable) {
    use FixtureValue as V;
    match (data_type, value) {
        (DataType::Boolean, V::Bool(b)) => out.push(*b as u8),
        (DataType::Int8, V::Int(v)) => out.push(*v as i8 as u8),
        (DataType::Int16, V::Int(v)) => out.extend_from_slice(&(*v as i16).to_le_bytes()),
        (DataType::Int32, V::Int(v)) => out.extend_from_slice(&(*v as i32).to_le_bytes()),
        (DataType::Int64, V::Int(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (DataType::UInt8, V::UInt(v)) => out.push(*v as u8),
        (DataType::UInt16, V::UInt(v)) => out.extend_from_slice(&(*v as u16).to_le_bytes()),
        (DataType::UInt32, V::UInt(v)) => out.extend_from_slice(&(*v as u32).to_le_bytes()),
        (DataType::UInt64, V::UInt(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (DataType::Single, V::Float(v)) => out.extend_from_slice(&(*v as f32).to_le_bytes()),
        (DataType::Double, V::Float(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (DataType::Guid, V::Guid(g)) => out.extend_from_slice(&g.to_wire()),
        (DataType::String | DataType::Locale | DataType::Enum, V::Str(s)) => {
            out.extend_from_slice(&text.intern(s).to_le_bytes())
        }
        (DataType::Reference, V::Reference(r)) => {
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&r.unwrap_or(Guid::EMPTY).to_wire());
        }
        (DataType::StrongPointer | DataType::WeakPointer, V::Pointer(p)) => {
            let (s, i) = p.map_or((0xFFFF_FFFF, 0xFFFF), |p| {
                (p.struct_index, p.instance_index as u16)
            });
            out.extend_from_slice(&s.to_le_bytes());
            out.extend_from_slice(&i.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        (t, v) => panic!("cannot encode {:?} as {:?}", v, t),
    }
}
