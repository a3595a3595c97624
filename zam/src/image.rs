//! Bytecode image container.
//!
//! An image is a run of section payloads followed by one fixed-size header
//! per section and a trailer. The trailer names the section count and
//! carries the magic string; headers are walked back to front to recover
//! each payload's byte range.

use std::path::Path;

use crate::{VmError, VmResult};

/// Magic string closing every image.
const IMAGE_MAGIC: &[u8; 12] = b"Caml1999X011";

/// Bytes of the trailer: section count plus magic.
const TRAILER_BYTES: usize = 4 + IMAGE_MAGIC.len();

/// Bytes of one section header: 4-byte name plus big-endian size.
const SECTION_HEADER_BYTES: usize = 8;

/// The closed set of section types an image may carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SectionKind {
    /// Instruction words.
    Code,
    /// Serialized global data.
    Data,
    /// Names of the primitives the code links against.
    Prim,
    /// Shared libraries to load.
    Dlls,
    /// Shared library search path.
    Dlpt,
    /// Debug events.
    Dbug,
    /// Interface checksums.
    Crcs,
    /// Symbol table.
    Symb,
}

impl SectionKind {
    pub const ALL: [SectionKind; 8] = [
        SectionKind::Code,
        SectionKind::Data,
        SectionKind::Prim,
        SectionKind::Dlls,
        SectionKind::Dlpt,
        SectionKind::Dbug,
        SectionKind::Crcs,
        SectionKind::Symb,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Code => "CODE",
            SectionKind::Data => "DATA",
            SectionKind::Prim => "PRIM",
            SectionKind::Dlls => "DLLS",
            SectionKind::Dlpt => "DLPT",
            SectionKind::Dbug => "DBUG",
            SectionKind::Crcs => "CRCS",
            SectionKind::Symb => "SYMB",
        }
    }

    fn from_name(name: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name().as_bytes() == name)
    }
}

#[derive(Debug)]
struct Section {
    kind: SectionKind,
    start: usize,
    size: usize,
}

#[derive(Debug)]
pub struct Image {
    bytes: Vec<u8>,
    sections: Vec<Section>,
}

impl Image {
    pub fn open(path: impl AsRef<Path>) -> VmResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|err| {
            VmError::load(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::parse(bytes)
    }

    pub fn parse(bytes: Vec<u8>) -> VmResult<Self> {
        if bytes.len() < TRAILER_BYTES {
            return Err(VmError::load("too short for a trailer"));
        }
        let trailer = &bytes[bytes.len() - TRAILER_BYTES..];
        if &trailer[4..] != IMAGE_MAGIC {
            return Err(VmError::load("wrong magic"));
        }
        let count =
            u32::from_be_bytes(trailer[..4].try_into().unwrap()) as usize;

        let table_bytes = SECTION_HEADER_BYTES * count + TRAILER_BYTES;
        if bytes.len() < table_bytes {
            return Err(VmError::load("missing section headers"));
        }

        // Headers sit just before the trailer; payloads are packed in order
        // before them, so walking the table backwards recovers every range.
        let table_start = bytes.len() - table_bytes;
        let mut sections: Vec<Option<Section>> = Vec::new();
        sections.resize_with(count, || None);
        let mut payload_end = table_start;
        for i in (0..count).rev() {
            let header = &bytes[table_start + SECTION_HEADER_BYTES * i..]
                [..SECTION_HEADER_BYTES];
            let kind = SectionKind::from_name(&header[0..4]).ok_or_else(
                || {
                    VmError::load(format!(
                        "bad section name {:?}",
                        String::from_utf8_lossy(&header[0..4])
                    ))
                },
            )?;
            let size =
                u32::from_be_bytes(header[4..8].try_into().unwrap()) as usize;
            if size > payload_end {
                return Err(VmError::load(format!(
                    "bad offset for section {}",
                    kind.name()
                )));
            }
            payload_end -= size;
            if sections
                .iter()
                .flatten()
                .any(|s: &Section| s.kind == kind)
            {
                return Err(VmError::load(format!(
                    "duplicate section {}",
                    kind.name()
                )));
            }
            sections[i] = Some(Section {
                kind,
                start: payload_end,
                size,
            });
        }
        let sections = sections.into_iter().flatten().collect();
        Ok(Self { bytes, sections })
    }

    /// Section kinds present, in file order.
    pub fn sections(&self) -> impl Iterator<Item = SectionKind> + '_ {
        self.sections.iter().map(|s| s.kind)
    }

    pub fn find(&self, kind: SectionKind) -> Option<&[u8]> {
        self.sections
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| &self.bytes[s.start..s.start + s.size])
    }

    pub fn section(&self, kind: SectionKind) -> VmResult<&[u8]> {
        self.find(kind).ok_or_else(|| {
            VmError::load(format!("missing section {}", kind.name()))
        })
    }

    /// The code section as little-endian instruction words.
    pub fn code_words(&self) -> VmResult<Vec<u32>> {
        let code = self.section(SectionKind::Code)?;
        if code.len() % 4 != 0 {
            return Err(VmError::load("code section is not word aligned"));
        }
        Ok(code
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes(w.try_into().unwrap()))
            .collect())
    }

    /// A section holding NUL-terminated strings, such as the primitive
    /// name table.
    pub fn strings(&self, kind: SectionKind) -> VmResult<Vec<String>> {
        let mut data = self.section(kind)?;
        let mut out = Vec::new();
        while let Some(nul) = data.iter().position(|&b| b == 0) {
            let name = std::str::from_utf8(&data[..nul]).map_err(|_| {
                VmError::load(format!(
                    "section {} holds a non-utf8 name",
                    kind.name()
                ))
            })?;
            out.push(name.to_owned());
            data = &data[nul + 1..];
        }
        if !data.is_empty() {
            return Err(VmError::load(format!(
                "section {} ends inside a name",
                kind.name()
            )));
        }
        Ok(out)
    }
}
