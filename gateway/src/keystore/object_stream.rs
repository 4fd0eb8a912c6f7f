//! Java object serialization, as far as JCEKS needs it.
//!
//! A secret-key entry is a serialized `SealedObjectForKeyProtector`, and the
//! sealed plaintext inside it is another serialized object holding the key.
//! The reader below handles the grammar those streams use: objects with
//! superclass chains, class descriptors, back references, strings, arrays,
//! enum constants, and block-data annotations (skipped). Proxy classes,
//! resets and serialized exceptions are rejected.
//!
//! The writer emits exactly what `ObjectOutputStream` does for the two
//! object shapes we produce, so Java tooling reads our keystores.

use std::rc::Rc;

use thiserror::Error;
use zeroize::Zeroizing;

const STREAM_MAGIC: u16 = 0xACED;
const STREAM_VERSION: u16 = 5;
const BASE_HANDLE: u32 = 0x7E_0000;
const MAX_DEPTH: usize = 16;

const TC_NULL: u8 = 0x70;
const TC_REFERENCE: u8 = 0x71;
const TC_CLASSDESC: u8 = 0x72;
const TC_OBJECT: u8 = 0x73;
const TC_STRING: u8 = 0x74;
const TC_ARRAY: u8 = 0x75;
const TC_CLASS: u8 = 0x76;
const TC_BLOCKDATA: u8 = 0x77;
const TC_ENDBLOCKDATA: u8 = 0x78;
const TC_BLOCKDATALONG: u8 = 0x7A;
const TC_LONGSTRING: u8 = 0x7C;
const TC_ENUM: u8 = 0x7E;

const SC_WRITE_METHOD: u8 = 0x01;
const SC_SERIALIZABLE: u8 = 0x02;
const SC_EXTERNALIZABLE: u8 = 0x04;
const SC_BLOCK_DATA: u8 = 0x08;

/// Why a stream could not be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("truncated")]
    Truncated,

    #[error("not a Java serialization stream")]
    BadMagic,

    #[error("unexpected tag 0x{0:02x}")]
    UnexpectedTag(u8),

    #[error("unsupported tag 0x{0:02x}")]
    UnsupportedTag(u8),

    #[error("reference to unknown handle 0x{0:08x}")]
    BadReference(u32),

    #[error("invalid field type code 0x{0:02x}")]
    BadTypeCode(u8),

    #[error("string is not modified UTF-8")]
    BadString,

    #[error("objects nested deeper than {}", MAX_DEPTH)]
    TooDeep,

    #[error("top-level content is not an object")]
    NotAnObject,
}

// ---------------------------------------------------------------------------
// ByteReader
// ---------------------------------------------------------------------------

/// Big-endian cursor over a borrowed buffer.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], StreamError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(StreamError::Truncated)?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, StreamError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, StreamError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, StreamError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, StreamError> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(arr))
    }

    /// A `DataOutput.writeUTF` string: u16 length, then modified UTF-8.
    pub fn utf(&mut self) -> Result<String, StreamError> {
        let len = self.u16()? as usize;
        decode_modified_utf8(self.take(len)?)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

fn continuation(bytes: &[u8], i: usize) -> Result<u16, StreamError> {
    match bytes.get(i) {
        Some(b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
        _ => Err(StreamError::BadString),
    }
}

/// Java's modified UTF-8: NUL as `C0 80`, supplementary characters as
/// surrogate pairs of three bytes each.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, StreamError> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let (unit, width) = match b {
            0x01..=0x7F => (u16::from(b), 1),
            0xC0..=0xDF => ((u16::from(b & 0x1F) << 6) | continuation(bytes, i + 1)?, 2),
            0xE0..=0xEF => (
                (u16::from(b & 0x0F) << 12)
                    | (continuation(bytes, i + 1)? << 6)
                    | continuation(bytes, i + 2)?,
                3,
            ),
            _ => return Err(StreamError::BadString),
        };
        units.push(unit);
        i += width;
    }
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|_| StreamError::BadString)
}

pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Decoded values
// ---------------------------------------------------------------------------

/// A value read from the stream.
#[derive(Clone)]
pub enum Content {
    Null,
    String(String),
    Bytes(Zeroizing<Vec<u8>>),
    Object(Rc<Object>),
    /// Enum constant name.
    Enum(String),
    /// Primitives, class literals and arrays other than `byte[]`.
    Opaque,
}

/// A deserialized object: its class name and every serialized field of its
/// class hierarchy, superclass fields first.
pub struct Object {
    class: String,
    fields: Vec<(String, Content)>,
}

impl Object {
    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Field by name. A subclass field shadows a superclass field.
    pub fn field(&self, name: &str) -> Option<&Content> {
        self.fields
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn bytes(&self, name: &str) -> Option<&Zeroizing<Vec<u8>>> {
        match self.field(name)? {
            Content::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.field(name)? {
            Content::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of an enum constant field.
    pub fn constant(&self, name: &str) -> Option<&str> {
        match self.field(name)? {
            Content::Enum(constant) => Some(constant),
            _ => None,
        }
    }
}

struct FieldDesc {
    type_code: u8,
    name: String,
}

struct ClassDesc {
    name: String,
    flags: u8,
    fields: Vec<FieldDesc>,
    super_class: Option<Rc<ClassDesc>>,
}

enum Handle {
    Class(Rc<ClassDesc>),
    Content(Content),
    /// Assigned but still being read.
    Pending,
}

fn primitive_size(type_code: u8) -> Option<usize> {
    match type_code {
        b'B' | b'Z' => Some(1),
        b'C' | b'S' => Some(2),
        b'I' | b'F' => Some(4),
        b'J' | b'D' => Some(8),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

struct Deserializer<'r, 'a> {
    r: &'r mut ByteReader<'a>,
    handles: Vec<Handle>,
    depth: usize,
}

/// Reads one serialization stream holding a single top-level object and
/// leaves `r` just past it.
pub fn read_object(r: &mut ByteReader<'_>) -> Result<Rc<Object>, StreamError> {
    if r.u16()? != STREAM_MAGIC || r.u16()? != STREAM_VERSION {
        return Err(StreamError::BadMagic);
    }
    let mut de = Deserializer {
        r,
        handles: Vec::new(),
        depth: 0,
    };
    match de.content()? {
        Content::Object(object) => Ok(object),
        _ => Err(StreamError::NotAnObject),
    }
}

impl Deserializer<'_, '_> {
    fn reserve(&mut self) -> usize {
        self.handles.push(Handle::Pending);
        self.handles.len() - 1
    }

    fn handle(&mut self) -> Result<&Handle, StreamError> {
        let raw = self.r.u32()?;
        raw.checked_sub(BASE_HANDLE)
            .and_then(|i| self.handles.get(i as usize))
            .ok_or(StreamError::BadReference(raw))
    }

    fn enter(&mut self) -> Result<(), StreamError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(StreamError::TooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn content(&mut self) -> Result<Content, StreamError> {
        let tag = self.r.u8()?;
        self.content_for(tag)
    }

    fn content_for(&mut self, tag: u8) -> Result<Content, StreamError> {
        match tag {
            TC_NULL => Ok(Content::Null),
            TC_REFERENCE => match self.handle()? {
                Handle::Content(c) => Ok(c.clone()),
                _ => Err(StreamError::UnexpectedTag(TC_REFERENCE)),
            },
            TC_STRING => {
                let handle = self.reserve();
                let s = self.r.utf()?;
                self.handles[handle] = Handle::Content(Content::String(s.clone()));
                Ok(Content::String(s))
            }
            TC_LONGSTRING => {
                let handle = self.reserve();
                let len = usize::try_from(self.r.u64()?).map_err(|_| StreamError::Truncated)?;
                let s = decode_modified_utf8(self.r.take(len)?)?;
                self.handles[handle] = Handle::Content(Content::String(s.clone()));
                Ok(Content::String(s))
            }
            TC_OBJECT => self.object(),
            TC_ARRAY => self.array(),
            TC_ENUM => self.enum_constant(),
            TC_CLASS => {
                self.class_desc()?;
                let handle = self.reserve();
                self.handles[handle] = Handle::Content(Content::Opaque);
                Ok(Content::Opaque)
            }
            TC_CLASSDESC | TC_BLOCKDATA | TC_BLOCKDATALONG | TC_ENDBLOCKDATA => {
                Err(StreamError::UnexpectedTag(tag))
            }
            other => Err(StreamError::UnsupportedTag(other)),
        }
    }

    /// Reads a class descriptor in descriptor position.
    fn class_desc(&mut self) -> Result<Option<Rc<ClassDesc>>, StreamError> {
        match self.r.u8()? {
            TC_NULL => Ok(None),
            TC_REFERENCE => match self.handle()? {
                Handle::Class(desc) => Ok(Some(Rc::clone(desc))),
                _ => Err(StreamError::UnexpectedTag(TC_REFERENCE)),
            },
            TC_CLASSDESC => {
                self.enter()?;
                let name = self.r.utf()?;
                let _serial_version_uid = self.r.u64()?;
                let handle = self.reserve();
                let flags = self.r.u8()?;
                let count = self.r.u16()? as usize;

                let mut fields = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let type_code = self.r.u8()?;
                    let name = self.r.utf()?;
                    if primitive_size(type_code).is_none() {
                        if type_code != b'[' && type_code != b'L' {
                            return Err(StreamError::BadTypeCode(type_code));
                        }
                        // Field type signature, e.g. "Ljava/lang/String;".
                        if !matches!(self.content()?, Content::String(_)) {
                            return Err(StreamError::BadTypeCode(type_code));
                        }
                    }
                    fields.push(FieldDesc { type_code, name });
                }
                self.skip_annotation()?;
                let super_class = self.class_desc()?;

                let desc = Rc::new(ClassDesc {
                    name,
                    flags,
                    fields,
                    super_class,
                });
                self.handles[handle] = Handle::Class(Rc::clone(&desc));
                self.leave();
                Ok(Some(desc))
            }
            other => Err(StreamError::UnsupportedTag(other)),
        }
    }

    /// Skips annotation contents up to and including `TC_ENDBLOCKDATA`.
    fn skip_annotation(&mut self) -> Result<(), StreamError> {
        loop {
            match self.r.u8()? {
                TC_ENDBLOCKDATA => return Ok(()),
                TC_BLOCKDATA => {
                    let len = self.r.u8()? as usize;
                    self.r.take(len)?;
                }
                TC_BLOCKDATALONG => {
                    let len = self.r.u32()? as usize;
                    self.r.take(len)?;
                }
                tag => {
                    self.content_for(tag)?;
                }
            }
        }
    }

    fn object(&mut self) -> Result<Content, StreamError> {
        self.enter()?;
        let desc = self
            .class_desc()?
            .ok_or(StreamError::UnexpectedTag(TC_NULL))?;
        let handle = self.reserve();

        let mut chain = Vec::new();
        let mut current = Some(Rc::clone(&desc));
        while let Some(class) = current {
            current = class.super_class.clone();
            chain.push(class);
        }

        let mut fields = Vec::new();
        for class in chain.iter().rev() {
            if class.flags & SC_EXTERNALIZABLE != 0 {
                if class.flags & SC_BLOCK_DATA == 0 {
                    return Err(StreamError::UnsupportedTag(TC_OBJECT));
                }
                self.skip_annotation()?;
                continue;
            }
            if class.flags & SC_SERIALIZABLE == 0 {
                continue;
            }
            for field in &class.fields {
                let value = match primitive_size(field.type_code) {
                    Some(size) => {
                        self.r.take(size)?;
                        Content::Opaque
                    }
                    None => self.content()?,
                };
                fields.push((field.name.clone(), value));
            }
            if class.flags & SC_WRITE_METHOD != 0 {
                self.skip_annotation()?;
            }
        }

        let object = Rc::new(Object {
            class: desc.name.clone(),
            fields,
        });
        self.handles[handle] = Handle::Content(Content::Object(Rc::clone(&object)));
        self.leave();
        Ok(Content::Object(object))
    }

    fn array(&mut self) -> Result<Content, StreamError> {
        self.enter()?;
        let desc = self
            .class_desc()?
            .ok_or(StreamError::UnexpectedTag(TC_NULL))?;
        let handle = self.reserve();
        let len = self.r.u32()? as usize;

        let element = match desc.name.as_bytes() {
            [b'[', code, ..] => *code,
            _ => return Err(StreamError::BadTypeCode(b'[')),
        };
        let content = match (element, primitive_size(element)) {
            (b'B', _) => Content::Bytes(Zeroizing::new(self.r.take(len)?.to_vec())),
            (_, Some(size)) => {
                self.r.take(len.checked_mul(size).ok_or(StreamError::Truncated)?)?;
                Content::Opaque
            }
            (_, None) => {
                // Every element takes at least one byte.
                if len > self.r.remaining() {
                    return Err(StreamError::Truncated);
                }
                for _ in 0..len {
                    self.content()?;
                }
                Content::Opaque
            }
        };

        self.handles[handle] = Handle::Content(content.clone());
        self.leave();
        Ok(content)
    }

    fn enum_constant(&mut self) -> Result<Content, StreamError> {
        self.class_desc()?
            .ok_or(StreamError::UnexpectedTag(TC_NULL))?;
        let handle = self.reserve();
        let content = match self.content()? {
            Content::String(constant) => Content::Enum(constant),
            _ => return Err(StreamError::UnexpectedTag(TC_ENUM)),
        };
        self.handles[handle] = Handle::Content(content.clone());
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Serialized layout of a class we write.
pub struct ClassSpec {
    pub name: &'static str,
    pub serial_version_uid: u64,
    /// `(type code, field name, type signature)` in stream order.
    pub fields: &'static [(u8, &'static str, &'static str)],
    pub super_class: Option<&'static ClassSpec>,
}

const STRING_SIGNATURE: &str = "Ljava/lang/String;";
const BYTES_SIGNATURE: &str = "[B";

pub const BYTE_ARRAY: ClassSpec = ClassSpec {
    name: BYTES_SIGNATURE,
    serial_version_uid: 0xACF3_17F8_0608_54E0,
    fields: &[],
    super_class: None,
};

pub const SECRET_KEY_SPEC: ClassSpec = ClassSpec {
    name: "javax.crypto.spec.SecretKeySpec",
    serial_version_uid: 0x5B47_0B66_E230_614D,
    fields: &[
        (b'L', "algorithm", STRING_SIGNATURE),
        (b'[', "key", BYTES_SIGNATURE),
    ],
    super_class: None,
};

pub const SEALED_OBJECT: ClassSpec = ClassSpec {
    name: "javax.crypto.SealedObject",
    serial_version_uid: 0x3E36_3DA6_C3B7_5470,
    fields: &[
        (b'[', "encodedParams", BYTES_SIGNATURE),
        (b'[', "encryptedContent", BYTES_SIGNATURE),
        (b'L', "paramsAlg", STRING_SIGNATURE),
        (b'L', "sealAlg", STRING_SIGNATURE),
    ],
    super_class: None,
};

pub const SEALED_OBJECT_FOR_KEY_PROTECTOR: ClassSpec = ClassSpec {
    name: "com.sun.crypto.provider.SealedObjectForKeyProtector",
    serial_version_uid: 0xCD57_CA59_E730_BB53,
    fields: &[],
    super_class: Some(&SEALED_OBJECT),
};

/// Class written by `keytool -genseckey` in place of the key itself.
pub const KEY_REP: &str = "java.security.KeyRep";

/// Writes one serialization stream. Field values follow each
/// [`ObjectWriter::begin_object`] in the order the class spec lists them,
/// superclass fields first.
pub struct ObjectWriter {
    out: Zeroizing<Vec<u8>>,
    next_handle: u32,
    classes: Vec<(&'static str, u32)>,
    signatures: Vec<(&'static str, u32)>,
}

impl Default for ObjectWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectWriter {
    pub fn new() -> Self {
        let mut out = Zeroizing::new(Vec::with_capacity(256));
        out.extend_from_slice(&STREAM_MAGIC.to_be_bytes());
        out.extend_from_slice(&STREAM_VERSION.to_be_bytes());
        Self {
            out,
            next_handle: BASE_HANDLE,
            classes: Vec::new(),
            signatures: Vec::new(),
        }
    }

    fn new_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn utf(&mut self, s: &str) {
        let bytes = encode_modified_utf8(s);
        self.out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        self.out.extend_from_slice(&bytes);
    }

    fn reference(&mut self, handle: u32) {
        self.out.push(TC_REFERENCE);
        self.out.extend_from_slice(&handle.to_be_bytes());
    }

    fn lookup(table: &[(&'static str, u32)], name: &str) -> Option<u32> {
        table.iter().find(|(n, _)| *n == name).map(|(_, h)| *h)
    }

    fn class_desc(&mut self, spec: &'static ClassSpec) {
        if let Some(handle) = Self::lookup(&self.classes, spec.name) {
            self.reference(handle);
            return;
        }
        self.out.push(TC_CLASSDESC);
        self.utf(spec.name);
        self.out.extend_from_slice(&spec.serial_version_uid.to_be_bytes());
        let handle = self.new_handle();
        self.classes.push((spec.name, handle));

        self.out.push(SC_SERIALIZABLE);
        self.out.extend_from_slice(&(spec.fields.len() as u16).to_be_bytes());
        for &(type_code, name, signature) in spec.fields {
            self.out.push(type_code);
            self.utf(name);
            if primitive_size(type_code).is_none() {
                match Self::lookup(&self.signatures, signature) {
                    Some(handle) => self.reference(handle),
                    None => {
                        self.out.push(TC_STRING);
                        let handle = self.new_handle();
                        self.signatures.push((signature, handle));
                        self.utf(signature);
                    }
                }
            }
        }
        self.out.push(TC_ENDBLOCKDATA);

        match spec.super_class {
            Some(parent) => self.class_desc(parent),
            None => self.out.push(TC_NULL),
        }
    }

    pub fn begin_object(&mut self, spec: &'static ClassSpec) {
        self.out.push(TC_OBJECT);
        self.class_desc(spec);
        self.new_handle();
    }

    pub fn string(&mut self, s: &str) {
        self.out.push(TC_STRING);
        self.new_handle();
        self.utf(s);
    }

    pub fn byte_array(&mut self, bytes: &[u8]) {
        self.out.push(TC_ARRAY);
        self.class_desc(&BYTE_ARRAY);
        self.new_handle();
        self.out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.out.extend_from_slice(bytes);
    }

    pub fn finish(self) -> Zeroizing<Vec<u8>> {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret_key_spec(key: &[u8]) -> Zeroizing<Vec<u8>> {
        let mut w = ObjectWriter::new();
        w.begin_object(&SECRET_KEY_SPEC);
        w.string("DESede");
        w.byte_array(key);
        w.finish()
    }

    #[test]
    fn test_secret_key_spec_matches_java_bytes() {
        // ObjectOutputStream bytes for a SecretKeySpec over {0x00, 0xFF}.
        let expected = hex::decode(
            "aced00057372001f6a617661782e63727970746f2e737065632e5365637265744b6579\
             537065635b470b66e230614d0200024c0009616c676f726974686d7400124c6a617661\
             2f6c616e672f537472696e673b5b00036b65797400025b427870740006444553656465\
             757200025b42acf317f8060854e002000078700000000200ff",
        )
        .unwrap();
        assert_eq!(secret_key_spec(&[0x00, 0xFF]).as_slice(), expected.as_slice());
    }

    #[test]
    fn test_read_back_written_object() {
        let stream = secret_key_spec(&[7u8; 24]);
        let mut r = ByteReader::new(&stream);
        let object = read_object(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        assert_eq!(object.class_name(), SECRET_KEY_SPEC.name);
        assert_eq!(object.string("algorithm"), Some("DESede"));
        assert_eq!(object.bytes("key").map(|k| k.as_slice()), Some(&[7u8; 24][..]));
        assert!(object.bytes("algorithm").is_none());
    }

    #[test]
    fn test_superclass_fields_and_back_references() {
        let mut w = ObjectWriter::new();
        w.begin_object(&SEALED_OBJECT_FOR_KEY_PROTECTOR);
        w.byte_array(b"params");
        w.byte_array(b"content");
        w.string("alg");
        w.string("alg");
        let stream = w.finish();

        // The second byte array reuses the `[B` descriptor by reference.
        assert_eq!(stream.windows(2).filter(|p| *p == b"[B").count(), 2);

        let object = read_object(&mut ByteReader::new(&stream)).unwrap();
        assert_eq!(object.class_name(), SEALED_OBJECT_FOR_KEY_PROTECTOR.name);
        assert_eq!(object.bytes("encodedParams").unwrap().as_slice(), b"params");
        assert_eq!(object.bytes("encryptedContent").unwrap().as_slice(), b"content");
        assert_eq!(object.string("sealAlg"), Some("alg"));
    }

    #[test]
    fn test_key_rep_with_enum_field() {
        // What keytool stores for a generated DESede key.
        let stream = hex::decode(
            "aced0005737200146a6176612e73656375726974792e4b6579526570bdf94fb3889aa543\
             0200044c0009616c676f726974686d7400124c6a6176612f6c616e672f537472696e673b\
             5b0007656e636f6465647400025b424c0006666f726d617471007e00014c000474797065\
             74001b4c6a6176612f73656375726974792f4b657952657024547970653b787074000644\
             4553656465757200025b42acf317f8060854e00200007870000000020102740003524157\
             7e7200196a6176612e73656375726974792e4b6579526570245479706500000000000000\
             001200007872000e6a6176612e6c616e672e456e756d0000000000000000120000787074\
             0006534543524554",
        )
        .unwrap();
        let object = read_object(&mut ByteReader::new(&stream)).unwrap();
        assert_eq!(object.class_name(), KEY_REP);
        assert_eq!(object.string("algorithm"), Some("DESede"));
        assert_eq!(object.string("format"), Some("RAW"));
        assert_eq!(object.constant("type"), Some("SECRET"));
        assert_eq!(object.bytes("encoded").unwrap().as_slice(), &[1, 2]);
    }

    #[test]
    fn test_rejects_malformed_streams() {
        let good = secret_key_spec(&[1u8; 16]);

        let mut bad_magic = good.to_vec();
        bad_magic[0] = 0x00;
        assert_eq!(
            read_object(&mut ByteReader::new(&bad_magic)).err(),
            Some(StreamError::BadMagic)
        );

        for cut in [4, 5, 20, good.len() - 1] {
            assert_eq!(
                read_object(&mut ByteReader::new(&good[..cut])).err(),
                Some(StreamError::Truncated),
                "cut at {cut}"
            );
        }

        let string_only = [0xAC, 0xED, 0x00, 0x05, TC_STRING, 0x00, 0x01, b'x'];
        assert_eq!(
            read_object(&mut ByteReader::new(&string_only)).err(),
            Some(StreamError::NotAnObject)
        );

        let dangling = [0xAC, 0xED, 0x00, 0x05, TC_OBJECT, TC_REFERENCE, 0x00, 0x7E, 0x00, 0x09];
        assert_eq!(
            read_object(&mut ByteReader::new(&dangling)).err(),
            Some(StreamError::BadReference(0x7E_0009))
        );

        let proxy = [0xAC, 0xED, 0x00, 0x05, TC_OBJECT, 0x7D];
        assert_eq!(
            read_object(&mut ByteReader::new(&proxy)).err(),
            Some(StreamError::UnsupportedTag(0x7D))
        );
    }

    #[test]
    fn test_nesting_is_bounded() {
        let mut stream = vec![0xAC, 0xED, 0x00, 0x05];
        for _ in 0..=MAX_DEPTH {
            stream.extend_from_slice(&[TC_ARRAY, TC_CLASSDESC, 0x00, 0x02, b'[', b'L']);
            stream.extend_from_slice(&[0u8; 8]);
            stream.extend_from_slice(&[SC_SERIALIZABLE, 0x00, 0x00, TC_ENDBLOCKDATA, TC_NULL]);
            stream.extend_from_slice(&1u32.to_be_bytes());
        }
        assert_eq!(
            read_object(&mut ByteReader::new(&stream)).err(),
            Some(StreamError::TooDeep)
        );
    }

    #[test]
    fn test_modified_utf8() {
        let text = "pg\u{0}key\u{e9}\u{1F511}";
        let encoded = encode_modified_utf8(text);
        assert!(encoded.windows(2).any(|w| w == [0xC0, 0x80]));
        assert!(!encoded.contains(&0x00));
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), text);
        assert_eq!(decode_modified_utf8(&[0x00]), Err(StreamError::BadString));
        assert_eq!(decode_modified_utf8(&[0xE0, 0x80]), Err(StreamError::BadString));
    }
}
