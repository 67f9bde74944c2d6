use std::collections::BTreeMap;
use std::fmt;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

const MAGIC: &[u8; 4] = b"RMSX";
const VERSION: u8 = 1;

// A named bag of values captured from one component. Records nest, so a mapper's record can
// carry its flash or EEPROM as children. Page bindings never go in here: they are re-derived
// from register state after a load.
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct StateRecord {
    tag: String,
    fields: BTreeMap<String, StateValue>,
    children: BTreeMap<String, StateRecord>,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum StateValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bytes(Vec<u8>),
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, FromPrimitive)]
enum ValueType {
    Bool = 0,
    U8 = 1,
    U16 = 2,
    U32 = 3,
    U64 = 4,
    Bytes = 5,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum StateError {
    BadMagic,
    UnsupportedVersion(u8),
    Truncated,
    TrailingData,
    BadValueType(u8),
    BadText,
    BadTag { expected: String, found: String },
    MissingKey(String),
    WrongType(String),
    WrongLength { key: String, expected: usize, found: usize },
    BadValue { key: String, value: u64 },
    MapperMismatch { expected: usize, found: usize },
    CartridgeMismatch { expected: String, found: String },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::BadMagic => write!(f, "Not a save state."),
            StateError::UnsupportedVersion(version) => write!(f, "Unsupported save state version {version}."),
            StateError::Truncated => write!(f, "Save state ended early."),
            StateError::TrailingData => write!(f, "Save state has unexpected data at its end."),
            StateError::BadValueType(value_type) => write!(f, "Unknown value type {value_type}."),
            StateError::BadText => write!(f, "Save state contains malformed text."),
            StateError::BadTag { expected, found } =>
                write!(f, "Expected a '{expected}' record but found '{found}'."),
            StateError::MissingKey(key) => write!(f, "Save state is missing '{key}'."),
            StateError::WrongType(key) => write!(f, "Save state value '{key}' has the wrong type."),
            StateError::WrongLength { key, expected, found } =>
                write!(f, "Save state value '{key}' has {found} bytes, expected {expected}."),
            StateError::BadValue { key, value } =>
                write!(f, "Save state value '{key}' can't be {value}."),
            StateError::MapperMismatch { expected, found } =>
                write!(f, "Save state has {found} cartridges but {expected} are attached."),
            StateError::CartridgeMismatch { expected, found } =>
                write!(f, "Save state was made with {found}, but {expected} is attached."),
        }
    }
}

impl std::error::Error for StateError {}

impl StateRecord {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_owned(), fields: BTreeMap::new(), children: BTreeMap::new() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn expect_tag(&self, expected: &str) -> Result<(), StateError> {
        if self.tag == expected {
            Ok(())
        } else {
            Err(StateError::BadTag { expected: expected.to_owned(), found: self.tag.clone() })
        }
    }

    pub fn set(&mut self, key: &str, value: StateValue) {
        self.fields.insert(key.to_owned(), value);
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, StateValue::Bool(value));
    }

    pub fn set_u8(&mut self, key: &str, value: u8) {
        self.set(key, StateValue::U8(value));
    }

    pub fn set_u16(&mut self, key: &str, value: u16) {
        self.set(key, StateValue::U16(value));
    }

    pub fn set_u32(&mut self, key: &str, value: u32) {
        self.set(key, StateValue::U32(value));
    }

    pub fn set_u64(&mut self, key: &str, value: u64) {
        self.set(key, StateValue::U64(value));
    }

    pub fn set_bytes(&mut self, key: &str, value: &[u8]) {
        self.set(key, StateValue::Bytes(value.to_vec()));
    }

    pub fn set_child(&mut self, key: &str, record: StateRecord) {
        self.children.insert(key.to_owned(), record);
    }

    fn get(&self, key: &str) -> Result<&StateValue, StateError> {
        self.fields.get(key).ok_or_else(|| StateError::MissingKey(key.to_owned()))
    }

    pub fn bool(&self, key: &str) -> Result<bool, StateError> {
        match self.get(key)? {
            StateValue::Bool(value) => Ok(*value),
            _ => Err(StateError::WrongType(key.to_owned())),
        }
    }

    pub fn u8(&self, key: &str) -> Result<u8, StateError> {
        match self.get(key)? {
            StateValue::U8(value) => Ok(*value),
            _ => Err(StateError::WrongType(key.to_owned())),
        }
    }

    pub fn u16(&self, key: &str) -> Result<u16, StateError> {
        match self.get(key)? {
            StateValue::U16(value) => Ok(*value),
            _ => Err(StateError::WrongType(key.to_owned())),
        }
    }

    pub fn u32(&self, key: &str) -> Result<u32, StateError> {
        match self.get(key)? {
            StateValue::U32(value) => Ok(*value),
            _ => Err(StateError::WrongType(key.to_owned())),
        }
    }

    pub fn u64(&self, key: &str) -> Result<u64, StateError> {
        match self.get(key)? {
            StateValue::U64(value) => Ok(*value),
            _ => Err(StateError::WrongType(key.to_owned())),
        }
    }

    pub fn bytes(&self, key: &str) -> Result<&[u8], StateError> {
        match self.get(key)? {
            StateValue::Bytes(value) => Ok(value),
            _ => Err(StateError::WrongType(key.to_owned())),
        }
    }

    pub fn bytes_of_len(&self, key: &str, len: usize) -> Result<&[u8], StateError> {
        let bytes = self.bytes(key)?;
        if bytes.len() != len {
            return Err(StateError::WrongLength { key: key.to_owned(), expected: len, found: bytes.len() });
        }

        Ok(bytes)
    }

    // Copies a byte field into a buffer that must be exactly the saved length.
    pub fn bytes_into(&self, key: &str, destination: &mut [u8]) -> Result<(), StateError> {
        let bytes = self.bytes_of_len(key, destination.len())?;
        destination.copy_from_slice(bytes);
        Ok(())
    }

    pub fn byte_array<const N: usize>(&self, key: &str) -> Result<[u8; N], StateError> {
        let mut array = [0; N];
        self.bytes_into(key, &mut array)?;
        Ok(array)
    }

    pub fn child(&self, key: &str) -> Result<&StateRecord, StateError> {
        self.children.get(key).ok_or_else(|| StateError::MissingKey(key.to_owned()))
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &StateRecord)> {
        self.children.iter().map(|(key, record)| (key.as_str(), record))
    }

    // The whole record as an opaque blob, prefixed so that foreign data is rejected on load.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        self.encode(&mut out);
        out
    }

    pub fn from_blob(blob: &[u8]) -> Result<StateRecord, StateError> {
        let mut reader = Reader { data: blob, position: 0 };
        if reader.take(MAGIC.len())? != MAGIC {
            return Err(StateError::BadMagic);
        }

        let version = reader.u8()?;
        if version != VERSION {
            return Err(StateError::UnsupportedVersion(version));
        }

        let record = StateRecord::decode(&mut reader)?;
        if reader.position != blob.len() {
            return Err(StateError::TrailingData);
        }

        Ok(record)
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_text(out, &self.tag);
        out.extend_from_slice(&(self.fields.len() as u16).to_le_bytes());
        for (key, value) in &self.fields {
            write_text(out, key);
            match value {
                StateValue::Bool(value) => {
                    out.push(ValueType::Bool as u8);
                    out.push(u8::from(*value));
                }
                StateValue::U8(value) => {
                    out.push(ValueType::U8 as u8);
                    out.push(*value);
                }
                StateValue::U16(value) => {
                    out.push(ValueType::U16 as u8);
                    out.extend_from_slice(&value.to_le_bytes());
                }
                StateValue::U32(value) => {
                    out.push(ValueType::U32 as u8);
                    out.extend_from_slice(&value.to_le_bytes());
                }
                StateValue::U64(value) => {
                    out.push(ValueType::U64 as u8);
                    out.extend_from_slice(&value.to_le_bytes());
                }
                StateValue::Bytes(value) => {
                    out.push(ValueType::Bytes as u8);
                    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
                    out.extend_from_slice(value);
                }
            }
        }

        out.extend_from_slice(&(self.children.len() as u16).to_le_bytes());
        for (key, child) in &self.children {
            write_text(out, key);
            child.encode(out);
        }
    }

    fn decode(reader: &mut Reader) -> Result<StateRecord, StateError> {
        let mut record = StateRecord::new(&reader.text()?);
        let field_count = reader.u16()?;
        for _ in 0..field_count {
            let key = reader.text()?;
            let raw_type = reader.u8()?;
            let value_type = ValueType::from_u8(raw_type).ok_or(StateError::BadValueType(raw_type))?;
            let value = match value_type {
                ValueType::Bool => StateValue::Bool(reader.u8()? != 0),
                ValueType::U8 => StateValue::U8(reader.u8()?),
                ValueType::U16 => StateValue::U16(reader.u16()?),
                ValueType::U32 => StateValue::U32(reader.u32()?),
                ValueType::U64 => StateValue::U64(u64::from_le_bytes(reader.array()?)),
                ValueType::Bytes => {
                    let len = reader.u32()? as usize;
                    StateValue::Bytes(reader.take(len)?.to_vec())
                }
            };
            record.fields.insert(key, value);
        }

        let child_count = reader.u16()?;
        for _ in 0..child_count {
            let key = reader.text()?;
            let child = StateRecord::decode(reader)?;
            record.children.insert(key, child);
        }

        Ok(record)
    }
}

fn write_text(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(&(text.len() as u16).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], StateError> {
        let end = self.position.checked_add(len).ok_or(StateError::Truncated)?;
        let data: &'a [u8] = self.data;
        let bytes = data.get(self.position..end).ok_or(StateError::Truncated)?;
        self.position = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StateError> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn u8(&mut self) -> Result<u8, StateError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, StateError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, StateError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn text(&mut self) -> Result<String, StateError> {
        let len = usize::from(self.u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StateError::BadText)
    }
}
