//! Parses the free-standing textual tracepoint descriptor a caller hands
//! this crate to name a tracepoint: a reference to an existing one, a
//! definition of a new `user_events` event, or an EventHeader-style
//! definition that names its level and keyword in the tracepoint name
//! itself.
//!
//! Grammar, covering three distinct shapes:
//! - **Identifier** — `:system:event`, `:event`, or bare `event` — a
//!   reference; no field declarations are permitted.
//! - **Definition** — `system:event field_decl; field_decl; …` — declares a
//!   brand new `user_events` event; `system`, if given, must be
//!   `user_events`.
//! - **EventHeader definition** — `system:ProviderName_L<level>K<keyword>[G<group>]`
//!   — declares an EventHeader-style event via a structured name suffix;
//!   same system restriction as a plain definition.
//!
//! `system` defaults to [`DEFAULT_SYSTEM`] everywhere it's omitted.

use error::*;

/// The system name assumed when a spec omits one, matching every
/// `user_events`-backed tracepoint this crate can define from scratch.
pub const DEFAULT_SYSTEM: &str = "user_events";

/// One parsed field declaration from a **Definition** spec's field list.
/// Stored close to verbatim (not fully typed, unlike
/// [`format::FieldMetadata`](::format::FieldMetadata)): the `user_events`
/// registration ioctl accepts the declaration text directly, so there is no
/// need to re-derive offsets/sizes the kernel will compute itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDecl {
    /// The full declaration, trimmed, e.g. `"u32 count"` or `"char name[20]"`.
    pub text: String,
    /// The declared field's name: the declaration's last whitespace-separated
    /// token, with any trailing `[...]` array suffix stripped.
    pub name: String,
}

/// One parsed tracepoint descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Spec {
    /// References a tracepoint that already exists (either a kernel-defined
    /// one or a `user_events` event defined in an earlier call).
    Identifier { system: String, event: String },
    /// Defines a new `user_events` event with the given fields.
    Definition {
        system: String,
        event: String,
        fields: Vec<FieldDecl>,
    },
    /// Defines a new EventHeader-style event: a `user_events` event whose
    /// name encodes a severity level and category keyword bitmask.
    EventHeader {
        system: String,
        provider_name: String,
        level: u8,
        keyword: u64,
        /// The optional `G<name>` suffix: the provider group this event
        /// belongs to, if any.
        group: Option<String>,
    },
}

impl Spec {
    pub fn system(&self) -> &str {
        match self {
            Spec::Identifier { system, .. } => system,
            Spec::Definition { system, .. } => system,
            Spec::EventHeader { system, .. } => system,
        }
    }

    /// The event name this spec resolves to in tracefs: the bare event name
    /// for an identifier or definition, or the full `ProviderName_L..K..`
    /// name for an EventHeader definition (the name the kernel actually
    /// registers and the one a format file's `name:` line will carry).
    pub fn event_name(&self) -> String {
        match self {
            Spec::Identifier { event, .. } => event.clone(),
            Spec::Definition { event, .. } => event.clone(),
            Spec::EventHeader {
                provider_name,
                level,
                keyword,
                group,
                ..
            } => {
                let mut name = format!("{}_L{:x}K{:x}", provider_name, level, keyword);
                if let Some(group) = group {
                    name.push('G');
                    name.push_str(group);
                }
                name
            }
        }
    }
}

/// Distinct failure kinds a malformed tracepoint descriptor can produce, so
/// a caller can match on the specific problem rather than a single opaque
/// message.
#[derive(Clone, Debug, Eq, PartialEq, Fail)]
pub enum SpecError {
    #[fail(display = "tracepoint spec is empty")]
    EmptyName,
    #[fail(display = "invalid name '{}': names may only contain [A-Za-z0-9_]", name)]
    InvalidName { name: String },
    #[fail(
        display = "invalid system '{}': definitions must use '{}'",
        system, DEFAULT_SYSTEM
    )]
    InvalidSystem { system: String },
    #[fail(display = "identifier '{}' may not carry field declarations", spec)]
    ForbiddenFieldOnIdentifier { spec: String },
    #[fail(display = "definition '{}' declares no fields", spec)]
    EmptyDefinition { spec: String },
    #[fail(display = "malformed field declaration '{}'", decl)]
    InvalidFieldDecl { decl: String },
    #[fail(display = "malformed EventHeader name suffix in '{}'", name)]
    InvalidEventHeaderSuffix { name: String },
}

/// Parses one free-standing tracepoint descriptor.
pub fn parse(text: &str) -> Result<Spec> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SpecError::EmptyName.into());
    }

    if let Some(rest) = text.strip_prefix(':') {
        return parse_identifier(rest, text);
    }

    // No leading colon: either a bare identifier (no colon at all), or a
    // "system:rest" definition/EventHeader/identifier-without-colon-prefix.
    // A colon inside the name portion (before any whitespace/field list)
    // splits system from the rest; its absence means the whole token is an
    // identifier in the default system.
    let head = text.split(';').next().unwrap_or(text);
    let head = head.split_whitespace().next().unwrap_or(head);

    match head.find(':') {
        None => parse_identifier(text, text),
        Some(colon_at) => {
            let system = &text[..colon_at];
            let rest = text[colon_at + 1..].trim_start();
            parse_system_prefixed(system, rest, text)
        }
    }
}

/// Parses the remainder of an Identifier shape: either `system:event` (if
/// `rest` contains a colon) or a bare `event` in the default system. Forbids
/// anything resembling a field list trailing the name.
fn parse_identifier(rest: &str, whole: &str) -> Result<Spec> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(SpecError::EmptyName.into());
    }
    if rest.contains(';') || rest.contains(char::is_whitespace) {
        return Err(SpecError::ForbiddenFieldOnIdentifier {
            spec: whole.to_string(),
        }
        .into());
    }

    let (system, event) = match rest.find(':') {
        Some(at) => (&rest[..at], &rest[at + 1..]),
        None => (DEFAULT_SYSTEM, rest),
    };

    validate_name(system)?;
    validate_name(event)?;

    Ok(Spec::Identifier {
        system: system.to_string(),
        event: event.to_string(),
    })
}

/// Parses `rest` once `system` has been split off a non-identifier-shaped
/// spec: either a field-list Definition or an EventHeader suffix name.
/// `system` must be [`DEFAULT_SYSTEM`] for either shape.
fn parse_system_prefixed(system: &str, rest: &str, whole: &str) -> Result<Spec> {
    if system.is_empty() {
        return Err(SpecError::EmptyName.into());
    }
    validate_name(system)?;
    if system != DEFAULT_SYSTEM {
        return Err(SpecError::InvalidSystem {
            system: system.to_string(),
        }
        .into());
    }

    if let Some(space_at) = rest.find(char::is_whitespace) {
        let name = &rest[..space_at];
        let field_text = rest[space_at..].trim();
        validate_name(name)?;
        let fields = parse_field_list(field_text)?;
        if fields.is_empty() {
            return Err(SpecError::EmptyDefinition {
                spec: whole.to_string(),
            }
            .into());
        }
        return Ok(Spec::Definition {
            system: system.to_string(),
            event: name.to_string(),
            fields,
        });
    }

    if let Some(header) = try_parse_event_header(rest) {
        validate_name(&header.0)?;
        return Ok(Spec::EventHeader {
            system: system.to_string(),
            provider_name: header.0,
            level: header.1,
            keyword: header.2,
            group: header.3,
        });
    }

    // No whitespace (so no field list) and no recognizable EventHeader
    // suffix: treat as a bare "system:event" reference.
    validate_name(rest)?;
    Ok(Spec::Identifier {
        system: system.to_string(),
        event: rest.to_string(),
    })
}

/// Splits a `field_decl; field_decl; …` list and validates each declaration
/// is at least a recognizable `type name` pair.
fn parse_field_list(text: &str) -> Result<Vec<FieldDecl>> {
    let mut fields = Vec::new();
    for clause in text.split(';') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        fields.push(parse_field_decl(clause)?);
    }
    Ok(fields)
}

/// Parses one `user_events`-style field declaration: a C declarator,
/// `type name` or `type name[N]`, the array suffix (if any) trailing the
/// name exactly as it does in a tracefs `format` file's `field:` clause.
/// Unlike [`format::parse`](::format::parse)'s field decls, there is no
/// `offset:`/`size:`/`signed:` annotation to recover — the kernel computes
/// those when the declaration is registered — so only the name needs
/// extracting.
fn parse_field_decl(decl: &str) -> Result<FieldDecl> {
    let no_star = decl.replace('*', " ");

    // Strip a trailing "[N]" or "[]" off the declarator before splitting off
    // the name, matching format::parse_decl's trailing-array convention.
    let before_array = match no_star.rfind('[') {
        Some(open) if no_star.trim_end().ends_with(']') => &no_star[..open],
        _ => no_star.as_str(),
    };

    let tokens: Vec<&str> = before_array.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(SpecError::InvalidFieldDecl {
            decl: decl.to_string(),
        }
        .into());
    }

    Ok(FieldDecl {
        text: decl.to_string(),
        name: tokens[tokens.len() - 1].to_string(),
    })
}

/// Attempts to parse `name` as an EventHeader suffix:
/// `ProviderName_L<hex level>K<hex keyword>[G<group>]`. Tries every `_L`
/// occurrence left to right (provider names are vanishingly unlikely to
/// embed one themselves) and accepts the first that parses cleanly through
/// to the end of the string.
///
/// Returns `(provider_name, level, keyword, group)`.
fn try_parse_event_header(name: &str) -> Option<(String, u8, u64, Option<String>)> {
    let bytes = name.as_bytes();
    let mut search_from = 0;

    while let Some(rel) = name[search_from..].find("_L") {
        let marker_at = search_from + rel;
        if let Some(parsed) = parse_event_header_suffix(&name[marker_at + 2..]) {
            let provider_name = &name[..marker_at];
            if !provider_name.is_empty() {
                return Some((provider_name.to_string(), parsed.0, parsed.1, parsed.2));
            }
        }
        search_from = marker_at + 2;
        if search_from >= bytes.len() {
            break;
        }
    }

    None
}

/// Parses `<hex level>K<hex keyword>[G<group>]` with nothing left over.
fn parse_event_header_suffix(suffix: &str) -> Option<(u8, u64, Option<String>)> {
    let k_at = suffix.find('K')?;
    let level_str = &suffix[..k_at];
    if level_str.is_empty() || !level_str.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let level = u8::from_str_radix(level_str, 16).ok()?;

    let after_k = &suffix[k_at + 1..];
    let keyword_end = after_k
        .find('G')
        .unwrap_or_else(|| after_k.len());
    let keyword_str = &after_k[..keyword_end];
    if keyword_str.is_empty() || !keyword_str.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let keyword = u64::from_str_radix(keyword_str, 16).ok()?;

    let group = &after_k[keyword_end..];
    let group = if group.is_empty() {
        None
    } else if let Some(rest) = group.strip_prefix('G') {
        if rest.is_empty() || !is_valid_name(rest) {
            return None;
        }
        Some(rest.to_string())
    } else {
        return None;
    };

    Some((level, keyword, group))
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SpecError::EmptyName.into());
    }
    if !is_valid_name(name) {
        return Err(SpecError::InvalidName {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_identifier_defaults_system() {
        let spec = parse("sched_switch").unwrap();
        assert_eq!(
            spec,
            Spec::Identifier {
                system: DEFAULT_SYSTEM.to_string(),
                event: "sched_switch".to_string(),
            }
        );
    }

    #[test]
    fn colon_prefixed_identifier_with_explicit_system() {
        let spec = parse(":sched:sched_switch").unwrap();
        assert_eq!(
            spec,
            Spec::Identifier {
                system: "sched".to_string(),
                event: "sched_switch".to_string(),
            }
        );
    }

    #[test]
    fn bare_system_colon_event_with_no_fields_is_an_identifier() {
        let spec = parse("user_events:myevent").unwrap();
        assert_eq!(
            spec,
            Spec::Identifier {
                system: DEFAULT_SYSTEM.to_string(),
                event: "myevent".to_string(),
            }
        );
    }

    #[test]
    fn definition_parses_fields_in_order() {
        let spec = parse("user_events:myevent u32 count; char name[20]").unwrap();
        match spec {
            Spec::Definition { system, event, fields } => {
                assert_eq!(system, DEFAULT_SYSTEM);
                assert_eq!(event, "myevent");
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].name, "count");
                assert_eq!(fields[1].name, "name");
            }
            other => panic!("expected Definition, got {:?}", other),
        }
    }

    #[test]
    fn definition_rejects_non_user_events_system() {
        let err = parse("sched:myevent u32 count;").unwrap_err();
        match err {
            Error::InvalidSpec {
                inner: SpecError::InvalidSystem { .. },
            } => {}
            other => panic!("expected InvalidSystem, got {:?}", other),
        }
    }

    #[test]
    fn identifier_rejects_trailing_field_list() {
        let err = parse(":sched:sched_switch u32 count;").unwrap_err();
        match err {
            Error::InvalidSpec {
                inner: SpecError::ForbiddenFieldOnIdentifier { .. },
            } => {}
            other => panic!("expected ForbiddenFieldOnIdentifier, got {:?}", other),
        }
    }

    #[test]
    fn empty_spec_is_rejected() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }

    #[test]
    fn event_header_suffix_parses_level_and_keyword() {
        let spec = parse("user_events:MyProvider_L3K2a").unwrap();
        match spec {
            Spec::EventHeader {
                system,
                provider_name,
                level,
                keyword,
                group,
            } => {
                assert_eq!(system, DEFAULT_SYSTEM);
                assert_eq!(provider_name, "MyProvider");
                assert_eq!(level, 0x3);
                assert_eq!(keyword, 0x2a);
                assert_eq!(group, None);
            }
            other => panic!("expected EventHeader, got {:?}", other),
        }
        assert_eq!(
            parse("user_events:MyProvider_L3K2a").unwrap().event_name(),
            "MyProvider_L3K2a"
        );
    }

    #[test]
    fn event_header_suffix_parses_optional_group() {
        let spec = parse("user_events:OtherProvider_L5K1fGperf").unwrap();
        match spec {
            Spec::EventHeader {
                provider_name,
                level,
                keyword,
                group,
                ..
            } => {
                assert_eq!(provider_name, "OtherProvider");
                assert_eq!(level, 0x5);
                assert_eq!(keyword, 0x1f);
                assert_eq!(group, Some("perf".to_string()));
            }
            other => panic!("expected EventHeader, got {:?}", other),
        }
    }

    #[test]
    fn invalid_name_characters_are_rejected() {
        let err = parse(":bad$system:event").unwrap_err();
        match err {
            Error::InvalidSpec {
                inner: SpecError::InvalidName { .. },
            } => {}
            other => panic!("expected InvalidName, got {:?}", other),
        }
    }
}
