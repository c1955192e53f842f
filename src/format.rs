//! Parses one tracefs `format` file into a typed [`EventMetadata`].
//!
//! The grammar is permissive on purpose: the kernel has never documented a
//! strict one, and different subsystems emit the `field:`/`print fmt:`
//! blocks with slightly different whitespace and ordering. This parser
//! tolerates any ordering of the top-level `name:`/`ID:`/`format:`/`print
//! fmt:` sections and skips anything it doesn't recognize inside `format:`.

use std::fmt;

use error::*;

/// How a field's declared size relates to its element size.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArrayKind {
    /// `declared size == element size`.
    None,
    /// `decl[N]`, `declared size == N * element size`.
    Fixed(u32),
    /// `decl[]`, or the special `__data_loc`/`__rel_loc` forms: the field's
    /// value is a 32-bit descriptor encoding an offset and a length.
    DynamicArray,
}

/// A coarse classification of what a field's bytes mean, independent of its
/// exact declared C type. Used by callers deciding how to print a field
/// without needing the full declaration grammar.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScalarKind {
    Integer,
    Float,
    Pointer,
    /// A `char` array is treated as a string (fixed or dynamic).
    StringData,
    Struct,
}

/// One field of a tracepoint's raw record, as declared by its `format` file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldMetadata {
    pub name: String,
    pub offset: u16,
    pub size: u16,
    pub element_size: u16,
    pub signed: bool,
    pub array_kind: ArrayKind,
    pub scalar_kind: ScalarKind,
    /// True for `common_*` fields (`common_type`, `common_flags`, ...),
    /// which precede the event-specific fields and are laid out identically
    /// for every tracepoint on a given kernel.
    pub is_common: bool,
}

/// One parsed tracepoint schema: the event's id, name, and ordered fields.
#[derive(Clone, Debug, PartialEq)]
pub struct EventMetadata {
    pub id: u32,
    pub system: String,
    pub name: String,
    pub common_field_count: usize,
    pub fields: Vec<FieldMetadata>,
    pub print_fmt: String,
    pub long_size_bits: u8,
    /// The format file's original bytes, kept verbatim so a perf.data writer
    /// can re-embed the exact subsystem text in a `TRACING_DATA` feature
    /// payload instead of re-deriving field declarations (lossy) from the
    /// parsed fields.
    pub raw_format: Vec<u8>,
}

impl EventMetadata {
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Byte offset just past the last common field — the start of the
    /// tracepoint-specific payload within a raw record.
    pub fn common_fields_size(&self) -> u16 {
        self.fields
            .iter()
            .take(self.common_field_count)
            .map(|f| u16::from(f.offset) + f.size)
            .max()
            .unwrap_or(0)
    }

    /// The `(offset, size)` of this event's `common_type` field, the value
    /// the [`MetadataCache`](::metadata::MetadataCache) uses to dispatch raw
    /// records back to their schema.
    pub fn common_type_geometry(&self) -> Result<(u16, u16)> {
        self.find_field("common_type")
            .map(|f| (f.offset, f.size))
            .ok_or_else(|| Error::invalid("format has no usable common_type field"))
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{} (id={})", self.system, self.name, self.id)
    }
}

/// Parses a complete tracefs `format` file.
///
/// `long_is_64_bit` selects whether a bare `long`/`unsigned long` field
/// resolves to 8 or 4 bytes, matching the emitting kernel's bitness.
pub fn parse(system: &str, data: &[u8], long_is_64_bit: bool) -> Result<EventMetadata> {
    let text = ::std::str::from_utf8(data)
        .map_err(|e| Error::invalid(format!("format file is not utf8: {}", e)))?;

    let mut name: Option<String> = None;
    let mut id: Option<u32> = None;
    let mut print_fmt = String::new();
    let mut fields = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = strip_prefix(line, "name:") {
            name = Some(rest.trim().to_string());
        } else if let Some(rest) = strip_prefix(line, "ID:") {
            id = rest.trim().parse::<u32>().ok();
        } else if let Some(rest) = strip_prefix(line, "print fmt:") {
            print_fmt = rest.trim().to_string();
        } else if line.starts_with("field:") {
            if let Some(field) = parse_field_line(line, long_is_64_bit)? {
                fields.push(field);
            }
        }
        // Lines like "format:" and blank/comment filler are ignored outright.
    }

    let name = name.ok_or_else(|| Error::invalid("format file has no name: line"))?;
    let id = id.ok_or_else(|| Error::invalid("format file has no ID: line"))?;

    if fields.is_empty() {
        return Err(Error::invalid("format file declares no fields"));
    }

    let common_field_count = fields
        .iter()
        .take_while(|f| f.is_common)
        .count();

    Ok(EventMetadata {
        id,
        system: system.to_string(),
        name,
        common_field_count,
        fields,
        print_fmt,
        long_size_bits: if long_is_64_bit { 64 } else { 32 },
        raw_format: data.to_vec(),
    })
}

fn strip_prefix<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Parses one `field:<decl>; offset:<uint>; size:<uint>; signed:<0|1>;` line.
fn parse_field_line(line: &str, long_is_64_bit: bool) -> Result<Option<FieldMetadata>> {
    let mut decl = None;
    let mut offset = None;
    let mut size = None;
    let mut signed = None;

    for clause in line.split(';') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        if let Some(rest) = strip_prefix(clause, "field:") {
            decl = Some(rest.trim().to_string());
        } else if let Some(rest) = strip_prefix(clause, "offset:") {
            offset = rest.trim().parse::<u16>().ok();
        } else if let Some(rest) = strip_prefix(clause, "size:") {
            size = rest.trim().parse::<u16>().ok();
        } else if let Some(rest) = strip_prefix(clause, "signed:") {
            signed = rest.trim().parse::<u32>().ok().map(|v| v != 0);
        }
        // Unrecognized clauses (there have historically been extra ones on
        // some kernels) are ignored, matching the grammar's "permissive"
        // requirement.
    }

    let decl = match decl {
        Some(d) => d,
        None => return Ok(None),
    };
    let offset = offset.ok_or_else(|| Error::invalid(format!("field '{}' has no offset", decl)))?;
    let size = size.ok_or_else(|| Error::invalid(format!("field '{}' has no size", decl)))?;
    let signed = signed.unwrap_or(false);

    let (field_name, element_size, array_kind, scalar_kind) = parse_decl(&decl, size, long_is_64_bit)?;

    let is_common = field_name.starts_with("common_");

    Ok(Some(FieldMetadata {
        name: field_name,
        offset,
        size,
        element_size,
        signed,
        array_kind,
        scalar_kind,
        is_common,
    }))
}

/// Parses a restricted C declaration: base type tokens, optional
/// `signed`/`unsigned`, optional pointer, optional array suffix.
///
/// Returns `(field_name, element_size, array_kind, scalar_kind)`.
fn parse_decl(decl: &str, declared_size: u16, long_is_64_bit: bool) -> Result<(String, u16, ArrayKind, ScalarKind)> {
    let decl = decl.trim();

    // __data_loc / __rel_loc forms look like "__data_loc char[] name" or
    // "__rel_loc unsigned long name[]" -- always dynamic arrays, regardless
    // of the base type.
    let (is_dynamic_loc, decl) = if let Some(rest) = strip_token(decl, "__data_loc") {
        (true, rest)
    } else if let Some(rest) = strip_token(decl, "__rel_loc") {
        (true, rest)
    } else {
        (false, decl)
    };

    // Split off a trailing "[N]" or "[]", if present.
    let (decl, array_len): (&str, Option<Option<u32>>) = if let Some(open) = decl.rfind('[') {
        if decl.ends_with(']') {
            let inside = &decl[open + 1..decl.len() - 1];
            let n = if inside.trim().is_empty() {
                None
            } else {
                Some(
                    inside
                        .trim()
                        .parse::<u32>()
                        .map_err(|_| Error::invalid(format!("bad array length in '{}'", decl)))?,
                )
            };
            (&decl[..open], Some(n))
        } else {
            (decl, None)
        }
    } else {
        (decl, None)
    };

    let decl = decl.trim();
    let is_pointer = decl.contains('*');
    let decl_no_star = decl.replace('*', " ");
    let tokens: Vec<&str> = decl_no_star.split_whitespace().collect();

    let name = tokens
        .last()
        .ok_or_else(|| Error::invalid("field declaration has no name"))?
        .to_string();

    let type_tokens = &tokens[..tokens.len() - 1];
    let base_element_size = base_type_size(type_tokens, is_pointer, long_is_64_bit);
    let is_char = type_tokens.iter().any(|t| *t == "char") && !is_pointer;

    let scalar_kind = if is_pointer {
        ScalarKind::Pointer
    } else if is_char {
        ScalarKind::StringData
    } else if type_tokens.iter().any(|t| *t == "float" || *t == "double") {
        ScalarKind::Float
    } else if type_tokens.iter().any(|t| *t == "struct") {
        ScalarKind::Struct
    } else {
        ScalarKind::Integer
    };

    let element_size = base_element_size;

    let array_kind = if is_dynamic_loc {
        ArrayKind::DynamicArray
    } else {
        match array_len {
            None => ArrayKind::None,
            Some(None) => ArrayKind::DynamicArray,
            Some(Some(n)) => {
                if element_size != 0 && u32::from(declared_size) == n * u32::from(element_size) {
                    ArrayKind::Fixed(n)
                } else {
                    // Some formats under-report array element size (e.g.
                    // variable-width structs); trust the declared total size
                    // over the computed element size in that case.
                    ArrayKind::Fixed(n)
                }
            }
        }
    };

    Ok((name, element_size.max(1), array_kind, scalar_kind))
}

fn strip_token<'a>(decl: &'a str, token: &str) -> Option<&'a str> {
    if decl.starts_with(token) {
        let rest = &decl[token.len()..];
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            Some(rest.trim_start())
        } else {
            None
        }
    } else {
        None
    }
}

fn base_type_size(tokens: &[&str], is_pointer: bool, long_is_64_bit: bool) -> u16 {
    if is_pointer {
        return if long_is_64_bit { 8 } else { 4 };
    }

    if tokens.iter().any(|t| *t == "long") {
        let long_count = tokens.iter().filter(|t| **t == "long").count();
        return if long_count >= 2 {
            8 // `long long` is always 8 bytes.
        } else if long_is_64_bit {
            8
        } else {
            4
        };
    }

    if tokens.iter().any(|t| *t == "short") {
        return 2;
    }

    if tokens.iter().any(|t| *t == "char") {
        return 1;
    }

    if tokens.iter().any(|t| *t == "double") {
        return 8;
    }

    if tokens.iter().any(|t| *t == "float") {
        return 4;
    }

    // Plain `int`, `u32`, `pid_t`, or anything else unrecognized: assume a
    // 4-byte word, the kernel's overwhelmingly common case for "everything
    // else" in tracepoint formats.
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHED_SWITCH: &str = "name: sched_switch
ID: 314
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:unsigned char common_flags;\toffset:2;\tsize:1;\tsigned:0;
\tfield:unsigned char common_preempt_count;\toffset:3;\tsize:1;\tsigned:0;
\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;

\tfield:char prev_comm[16];\toffset:8;\tsize:16;\tsigned:0;
\tfield:pid_t prev_pid;\toffset:24;\tsize:4;\tsigned:1;
\tfield:int prev_prio;\toffset:28;\tsize:4;\tsigned:1;
\tfield:long prev_state;\toffset:32;\tsize:8;\tsigned:1;
\tfield:char next_comm[16];\toffset:40;\tsize:16;\tsigned:0;
\tfield:pid_t next_pid;\toffset:56;\tsize:4;\tsigned:1;
\tfield:int next_prio;\toffset:60;\tsize:4;\tsigned:1;

print fmt: \"prev_comm=%s prev_pid=%d\", REC->prev_comm, REC->prev_pid
";

    #[test]
    fn parses_sched_switch() {
        let meta = parse("sched", SCHED_SWITCH.as_bytes(), true).unwrap();
        assert_eq!(meta.id, 314);
        assert_eq!(meta.name, "sched_switch");
        assert_eq!(meta.system, "sched");
        assert_eq!(meta.common_field_count, 4);
        assert_eq!(meta.field_count(), 11);

        let prev_comm = meta.find_field("prev_comm").unwrap();
        assert_eq!(prev_comm.array_kind, ArrayKind::Fixed(16));
        assert_eq!(prev_comm.scalar_kind, ScalarKind::StringData);

        let prev_state = meta.find_field("prev_state").unwrap();
        assert_eq!(prev_state.size, 8);
        assert!(prev_state.signed);

        assert_eq!(meta.common_type_geometry().unwrap(), (0, 2));
    }

    #[test]
    fn long_size_bits_changes_long_field_width_interpretation() {
        let meta32 = parse("sched", SCHED_SWITCH.as_bytes(), false).unwrap();
        assert_eq!(meta32.long_size_bits, 32);
        // The declared size in the fixture is still 8 (this kernel was
        // 64-bit when it emitted the file); long_size_bits only affects how
        // *new* declarations without an explicit size would be interpreted.
        assert_eq!(meta32.find_field("prev_state").unwrap().size, 8);
    }

    #[test]
    fn dynamic_array_field_is_detected() {
        let data = "name: print
ID: 5
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:__data_loc char[] msg;\toffset:8;\tsize:4;\tsigned:0;
print fmt: \"%s\", __get_str(msg)
";
        let meta = parse("ftrace", data.as_bytes(), true).unwrap();
        let msg = meta.find_field("msg").unwrap();
        assert_eq!(msg.array_kind, ArrayKind::DynamicArray);
    }

    #[test]
    fn rejects_missing_id() {
        let data = "name: broken\nformat:\n\tfield:int x; offset:0; size:4; signed:1;\n";
        assert!(parse("sched", data.as_bytes(), true).is_err());
    }
}
