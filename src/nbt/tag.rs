//! Tag definitions
//!
//! The in-memory tree the codec reads and writes.

use indexmap::IndexMap;

use crate::error::{Result, StoreError};

/// Named children of a compound, kept in insertion order
pub type Compound = IndexMap<String, Tag>;

/// Wire type ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagType {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

impl TagType {
    pub fn from_id(id: u8) -> Option<Self> {
        let ty = match id {
            0 => TagType::End,
            1 => TagType::Byte,
            2 => TagType::Short,
            3 => TagType::Int,
            4 => TagType::Long,
            5 => TagType::Float,
            6 => TagType::Double,
            7 => TagType::ByteArray,
            8 => TagType::String,
            9 => TagType::List,
            10 => TagType::Compound,
            11 => TagType::IntArray,
            12 => TagType::LongArray,
            _ => return None,
        };
        Some(ty)
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            TagType::End => "End",
            TagType::Byte => "Byte",
            TagType::Short => "Short",
            TagType::Int => "Int",
            TagType::Long => "Long",
            TagType::Float => "Float",
            TagType::Double => "Double",
            TagType::ByteArray => "ByteArray",
            TagType::String => "String",
            TagType::List => "List",
            TagType::Compound => "Compound",
            TagType::IntArray => "IntArray",
            TagType::LongArray => "LongArray",
        }
    }

    /// Smallest encoded payload for one value of this type.
    /// Used to reject list counts that cannot fit in the remaining input.
    pub(crate) fn min_payload_size(self) -> usize {
        match self {
            TagType::End => 0,
            TagType::Byte => 1,
            TagType::Short => 2,
            TagType::Int | TagType::Float => 4,
            TagType::Long | TagType::Double => 8,
            TagType::ByteArray | TagType::IntArray | TagType::LongArray => 4,
            TagType::String => 2,
            TagType::List => 5,
            TagType::Compound => 1,
        }
    }
}

/// A typed node of the record tree
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<u8>),
    String(String),
    List(List),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Tag {
    pub fn tag_type(&self) -> TagType {
        match self {
            Tag::Byte(_) => TagType::Byte,
            Tag::Short(_) => TagType::Short,
            Tag::Int(_) => TagType::Int,
            Tag::Long(_) => TagType::Long,
            Tag::Float(_) => TagType::Float,
            Tag::Double(_) => TagType::Double,
            Tag::ByteArray(_) => TagType::ByteArray,
            Tag::String(_) => TagType::String,
            Tag::List(_) => TagType::List,
            Tag::Compound(_) => TagType::Compound,
            Tag::IntArray(_) => TagType::IntArray,
            Tag::LongArray(_) => TagType::LongArray,
        }
    }

    /// Integer value of any integral tag, widened
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Tag::Byte(v) => Some(v as i64),
            Tag::Short(v) => Some(v as i64),
            Tag::Int(v) => Some(v as i64),
            Tag::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tag::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Tag::ByteArray(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Tag::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut List> {
        match self {
            Tag::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Tag::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_compound_mut(&mut self) -> Option<&mut Compound> {
        match self {
            Tag::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_compound(self) -> Option<Compound> {
        match self {
            Tag::Compound(c) => Some(c),
            _ => None,
        }
    }
}

macro_rules! tag_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Tag {
                fn from(v: $ty) -> Self {
                    Tag::$variant(v)
                }
            }
        )*
    };
}

tag_from! {
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Vec<u8> => ByteArray,
    String => String,
    List => List,
    Compound => Compound,
    Vec<i32> => IntArray,
    Vec<i64> => LongArray,
}

impl From<&str> for Tag {
    fn from(v: &str) -> Self {
        Tag::String(v.to_string())
    }
}

/// Ordered homogeneous list of tags
///
/// The element type is fixed when the list is created. An untyped list
/// (`List::new()`, element type `End`) takes the type of its first element.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    elem_type: TagType,
    items: Vec<Tag>,
}

impl List {
    /// Empty, untyped list
    pub fn new() -> Self {
        Self {
            elem_type: TagType::End,
            items: Vec::new(),
        }
    }

    /// Empty list that only accepts `elem_type`
    pub fn of(elem_type: TagType) -> Self {
        Self {
            elem_type,
            items: Vec::new(),
        }
    }

    /// Build a list from tags, which must all share one type
    pub fn from_tags(tags: Vec<Tag>) -> Result<Self> {
        let mut list = Self::new();
        for tag in tags {
            list.push(tag)?;
        }
        Ok(list)
    }

    /// Codec path: the decoder has already checked every element
    pub(crate) fn from_raw(elem_type: TagType, items: Vec<Tag>) -> Self {
        Self { elem_type, items }
    }

    pub fn elem_type(&self) -> TagType {
        self.elem_type
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Tag> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Tag> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.items.iter()
    }

    pub fn push(&mut self, tag: Tag) -> Result<()> {
        self.admit(&tag)?;
        self.items.push(tag);
        Ok(())
    }

    /// Panics if `index > len`, like `Vec::insert`
    pub fn insert(&mut self, index: usize, tag: Tag) -> Result<()> {
        self.admit(&tag)?;
        self.items.insert(index, tag);
        Ok(())
    }

    /// Replace the element at `index`, returning the old one
    pub fn set(&mut self, index: usize, tag: Tag) -> Result<Tag> {
        self.admit(&tag)?;
        let slot = self.items.get_mut(index).ok_or_else(|| {
            StoreError::Format(format!("list index {} out of range", index))
        })?;
        Ok(std::mem::replace(slot, tag))
    }

    pub fn remove(&mut self, index: usize) -> Option<Tag> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    fn admit(&mut self, tag: &Tag) -> Result<()> {
        let found = tag.tag_type();
        if self.elem_type == TagType::End {
            self.elem_type = found;
            return Ok(());
        }
        if found != self.elem_type {
            return Err(StoreError::TagType {
                expected: self.elem_type.name(),
                found: found.name(),
            });
        }
        Ok(())
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a List {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for List {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
