use std::collections::BTreeMap;

use regis_types::compact;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegisterError, RegisterResult};
use crate::field::{value_end, FieldType, FieldValue, ObjectValue, MUTABLE_MARKER};
use crate::state::{RegisterType, State};

/// Well-known object shapes recognised by their field names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standard {
    NonStandard,
    /// `balance` and `identifier`.
    Account,
    /// An account that also carries `trust` and `stake`.
    Trust,
    /// An account that also carries `supply` and `digits`.
    Token,
}

/// Location and shape of one parsed field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSlot {
    /// Offset of the type byte within the state data.
    pub offset: usize,
    pub field_type: FieldType,
    pub mutable: bool,
}

impl FieldSlot {
    fn value_offset(&self) -> usize {
        self.offset + 1
    }
}

/// An object register: a [`State`] whose data is a sequence of named fields.
///
/// Fields must be [`parse`](Self::parse)d before they can be read or
/// written. Writes rewrite the value bytes in place and never change the
/// data length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    state: State,
    fields: BTreeMap<String, FieldSlot>,
    parsed: bool,
}

impl Object {
    /// Wrap a state without parsing it.
    pub fn new(state: State) -> Self {
        Self {
            state,
            fields: BTreeMap::new(),
            parsed: false,
        }
    }

    /// Wrap and parse an object register.
    pub fn from_state(state: State) -> RegisterResult<Self> {
        if state.register_type != RegisterType::Object {
            return Err(RegisterError::NotObject);
        }
        let mut object = Self::new(state);
        object.parse()?;
        Ok(object)
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn into_state(self) -> State {
        self.state
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Build the field map from the state data.
    ///
    /// Fails on truncated values, unknown type bytes, invalid names and
    /// duplicate field names, leaving the object unparsed. Parsing an
    /// already parsed object is a no-op.
    pub fn parse(&mut self) -> RegisterResult<()> {
        if self.parsed {
            return Ok(());
        }
        let data = &self.state.data;
        let mut fields = BTreeMap::new();
        let mut pos = 0usize;

        while pos < data.len() {
            let field_start = pos;
            let (name, consumed) = compact::decode_bytes(&data[pos..]).map_err(|e| {
                RegisterError::Malformed {
                    offset: pos,
                    reason: format!("field name: {e}"),
                }
            })?;
            let name = std::str::from_utf8(name)
                .map_err(|e| RegisterError::Malformed {
                    offset: pos,
                    reason: format!("field name is not utf-8: {e}"),
                })?
                .to_string();
            pos += consumed;

            let mut mutable = false;
            let mut type_byte = type_byte_at(data, pos)?;
            if type_byte == MUTABLE_MARKER {
                mutable = true;
                pos += 1;
                type_byte = type_byte_at(data, pos)?;
            }
            let field_type =
                FieldType::from_byte(type_byte).ok_or(RegisterError::UnknownFieldType(type_byte))?;
            let offset = pos;
            pos = value_end(field_type, data, pos + 1)?;

            if fields.contains_key(&name) {
                return Err(RegisterError::DuplicateField(name));
            }
            debug!(field = %name, offset = field_start, ?field_type, mutable, "parsed field");
            fields.insert(
                name,
                FieldSlot {
                    offset,
                    field_type,
                    mutable,
                },
            );
        }

        self.fields = fields;
        self.parsed = true;
        Ok(())
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Field names in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.keys().map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<FieldSlot> {
        self.fields.get(name).copied()
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field(name).map(|slot| slot.field_type)
    }

    pub fn is_mutable(&self, name: &str) -> bool {
        self.field(name).is_some_and(|slot| slot.mutable)
    }

    fn slot(&self, name: &str) -> RegisterResult<FieldSlot> {
        if !self.parsed {
            return Err(RegisterError::NotParsed);
        }
        self.field(name)
            .ok_or_else(|| RegisterError::FieldNotFound(name.to_string()))
    }

    /// Read a field whatever its type.
    pub fn read_value(&self, name: &str) -> RegisterResult<FieldValue> {
        let slot = self.slot(name)?;
        let (value, _) = FieldValue::decode(slot.field_type, &self.state.data, slot.value_offset())?;
        Ok(value)
    }

    /// Read a field as `T`, failing if its stored type differs.
    pub fn read<T: ObjectValue>(&self, name: &str) -> RegisterResult<T> {
        let slot = self.slot(name)?;
        if slot.field_type != T::FIELD_TYPE {
            return Err(RegisterError::TypeMismatch {
                name: name.to_string(),
                stored: slot.field_type,
                requested: T::FIELD_TYPE,
            });
        }
        let value = self.read_value(name)?;
        T::from_field(value).ok_or_else(|| RegisterError::TypeMismatch {
            name: name.to_string(),
            stored: slot.field_type,
            requested: T::FIELD_TYPE,
        })
    }

    /// Every field with its value, in name order.
    pub fn values(&self) -> RegisterResult<Vec<(String, FieldValue)>> {
        self.fields
            .keys()
            .map(|name| Ok((name.clone(), self.read_value(name)?)))
            .collect()
    }

    /// Overwrite a mutable field in place.
    ///
    /// The value must have the field's type; strings and byte arrays must
    /// keep their stored length.
    pub fn write_value(&mut self, name: &str, value: FieldValue) -> RegisterResult<()> {
        let slot = self.slot(name)?;
        if !slot.mutable {
            return Err(RegisterError::Immutable(name.to_string()));
        }
        if value.field_type() != slot.field_type {
            return Err(RegisterError::TypeMismatch {
                name: name.to_string(),
                stored: slot.field_type,
                requested: value.field_type(),
            });
        }

        let start = slot.value_offset();
        let end = value_end(slot.field_type, &self.state.data, start)?;
        let mut encoded = Vec::with_capacity(end - start);
        value.encode(&mut encoded);
        if encoded.len() != end - start {
            return Err(RegisterError::SizeMismatch {
                name: name.to_string(),
                stored: end - start,
                given: encoded.len(),
            });
        }
        if end > self.state.data.len() {
            return Err(RegisterError::Overflow(name.to_string()));
        }
        self.state.data[start..end].copy_from_slice(&encoded);
        Ok(())
    }

    /// Overwrite a mutable field of type `T`.
    pub fn write<T: ObjectValue>(&mut self, name: &str, value: T) -> RegisterResult<()> {
        self.write_value(name, value.into_field())
    }

    pub fn write_str(&mut self, name: &str, value: &str) -> RegisterResult<()> {
        self.write_value(name, FieldValue::String(value.to_string()))
    }

    /// Classify the object by its field names. Unparsed objects are
    /// non-standard.
    pub fn standard(&self) -> Standard {
        let has = |name: &str| self.fields.contains_key(name);
        if !(has("balance") && has("identifier")) {
            return Standard::NonStandard;
        }
        if has("trust") && has("stake") {
            Standard::Trust
        } else if has("supply") && has("digits") {
            Standard::Token
        } else {
            Standard::Account
        }
    }

    /// The standard this object's standard derives from.
    pub fn base(&self) -> Standard {
        match self.standard() {
            Standard::Account | Standard::Trust | Standard::Token => Standard::Account,
            Standard::NonStandard => Standard::NonStandard,
        }
    }

    /// Storage cost of the parsed fields.
    ///
    /// Each field costs the width of its encoded type byte, mutability
    /// marker and value; mutable fields cost double.
    pub fn cost(&self) -> u64 {
        let data = &self.state.data;
        self.fields
            .values()
            .map(|slot| {
                let end = value_end(slot.field_type, data, slot.value_offset())
                    .unwrap_or(slot.value_offset());
                let width = (end - slot.offset + usize::from(slot.mutable)) as u64;
                if slot.mutable {
                    width * 2
                } else {
                    width
                }
            })
            .sum()
    }
}

fn type_byte_at(data: &[u8], pos: usize) -> RegisterResult<u8> {
    data.get(pos).copied().ok_or(RegisterError::Malformed {
        offset: pos,
        reason: "missing type byte".into(),
    })
}
