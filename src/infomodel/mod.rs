//! The IPFIX information model: Information Element metadata and the
//! process-wide registry that templates resolve against.
//!
//! References:
//! - <https://datatracker.ietf.org/doc/html/rfc7012>
//! - <https://www.iana.org/assignments/ipfix/ipfix.xhtml>
//! - <https://datatracker.ietf.org/doc/html/rfc5103> (reverse IEs)
//!
//! Elements are identified by `(enterprise number, element number)`; PEN 0 is
//! the IANA registry. The registry is loaded once (single writer) and then
//! read concurrently; handles are `Arc`-shared and never mutated, so a
//! length-adjusted variant produced for reduced-length encoding leaves the
//! registered element untouched.

pub mod iana;

use crate::IpfixError;
use crate::VARLEN;
use crate::types::IeType;

use nom::IResult;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char as spec_char, digit1};
use nom::combinator::{all_consuming, map_res, opt};
use nom::sequence::{delimited, pair, terminated};
use serde::Serialize;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

/// Private Enterprise Number under which RFC 5103 reverse elements live.
pub const REVERSE_PEN: u32 = 29305;

/// A named, numbered, typed field that may appear in flow records.
///
/// Immutable once registered; `(pen, num)` uniquely identifies an element.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Serialize)]
pub struct InformationElement {
    pub name: String,
    pub pen: u32,
    pub num: u16,
    pub ie_type: IeType,
    pub length: u16,
}

impl InformationElement {
    /// Creates a validated element. The element number must fit in 15 bits
    /// (the top bit is the on-wire enterprise flag) and the length must be
    /// one the type can carry.
    pub fn new(
        name: impl Into<String>,
        pen: u32,
        num: u16,
        ie_type: IeType,
        length: u16,
    ) -> Result<Self, IpfixError> {
        let name = name.into();
        if num == 0 || num > 0x7fff {
            return Err(IpfixError::InvalidSpec {
                spec: name,
                context: format!("element number {num} outside 1..32767"),
            });
        }
        if !ie_type.accepts_length(length) {
            return Err(IpfixError::InvalidSpec {
                spec: name,
                context: format!("length {length} incompatible with {}", ie_type.name()),
            });
        }
        Ok(Self::raw(name, pen, num, ie_type, length))
    }

    pub(crate) fn raw(
        name: impl Into<String>,
        pen: u32,
        num: u16,
        ie_type: IeType,
        length: u16,
    ) -> Self {
        Self {
            name: name.into(),
            pen,
            num,
            ie_type,
            length,
        }
    }

    pub fn is_varlen(&self) -> bool {
        self.length == VARLEN
    }

    /// Returns a copy of this element declared with a different length, for
    /// reduced-length encoding. The registry entry is not touched.
    pub fn for_length(&self, length: u16) -> Result<Self, IpfixError> {
        if !self.ie_type.accepts_length(length) {
            return Err(IpfixError::InvalidSpec {
                spec: self.name.clone(),
                context: format!("length {length} incompatible with {}", self.ie_type.name()),
            });
        }
        let mut ie = self.clone();
        ie.length = length;
        Ok(ie)
    }
}

/// Ordered sequence of elements, used as a template layout or as a
/// caller-supplied projection order for the tuple interfaces.
pub type IeList = Vec<Arc<InformationElement>>;

/// Registry of Information Elements keyed by `(pen, num)` and by name.
#[derive(Debug, Default)]
pub struct InfoModel {
    by_key: HashMap<(u32, u16), Arc<InformationElement>>,
    by_name: HashMap<String, Arc<InformationElement>>,
}

impl InfoModel {
    /// Registers an element, keeping the existing handle when an identical
    /// element is already present so repeated loads stay idempotent.
    pub fn add(&mut self, ie: InformationElement) -> Arc<InformationElement> {
        if let Some(existing) = self.by_key.get(&(ie.pen, ie.num)) {
            if **existing == ie {
                return Arc::clone(existing);
            }
        }
        let ie = Arc::new(ie);
        self.by_key.insert((ie.pen, ie.num), Arc::clone(&ie));
        self.by_name.insert(ie.name.clone(), Arc::clone(&ie));
        ie
    }

    pub fn get(&self, pen: u32, num: u16) -> Option<&Arc<InformationElement>> {
        self.by_key.get(&(pen, num))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Arc<InformationElement>> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_name.clear();
    }
}

static INFOMODEL: LazyLock<RwLock<InfoModel>> = LazyLock::new(RwLock::default);

fn read_model() -> std::sync::RwLockReadGuard<'static, InfoModel> {
    INFOMODEL.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_model() -> std::sync::RwLockWriteGuard<'static, InfoModel> {
    INFOMODEL.write().unwrap_or_else(PoisonError::into_inner)
}

/// Fields of a parsed IESpec, any combination of which may be present.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawSpec {
    name: Option<String>,
    pen: u32,
    num: Option<u16>,
    type_name: Option<String>,
    size: Option<u16>,
}

fn identifier(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(i)
}

fn decimal<T: FromStr>(i: &str) -> IResult<&str, T> {
    map_res(digit1, str::parse)(i)
}

/// `name? ( '(' (pen '/')? num ')' )? ( '<' typename '>' )? ( '[' size ']' )?`
fn iespec(i: &str) -> IResult<&str, RawSpec> {
    let (i, name) = opt(identifier)(i)?;
    let (i, key) = opt(delimited(
        spec_char('('),
        pair(opt(terminated(decimal::<u32>, spec_char('/'))), decimal::<u16>),
        spec_char(')'),
    ))(i)?;
    let (i, type_name) = opt(delimited(spec_char('<'), identifier, spec_char('>')))(i)?;
    let (i, size) = opt(delimited(spec_char('['), decimal::<u16>, spec_char(']')))(i)?;
    Ok((
        i,
        RawSpec {
            name: name.map(str::to_string),
            pen: key.and_then(|(pen, _)| pen).unwrap_or(0),
            num: key.map(|(_, num)| num),
            type_name: type_name.map(str::to_string),
            size,
        },
    ))
}

fn parse_spec(spec: &str) -> Result<RawSpec, IpfixError> {
    let (_, raw) =
        all_consuming(iespec)(spec.trim()).map_err(|_| IpfixError::InvalidSpec {
            spec: spec.to_string(),
            context: "unparseable IESpec".to_string(),
        })?;
    if raw.name.is_none() && raw.num.is_none() {
        return Err(IpfixError::InvalidSpec {
            spec: spec.to_string(),
            context: "neither a name nor an element number given".to_string(),
        });
    }
    Ok(raw)
}

/// Resolves an IESpec of the form `name(pen/num)<type>[size]`.
///
/// A spec carrying a `<type>` registers a new element (name and number are
/// then required). A partial spec looks up an existing element by number or
/// by name; a `[size]` produces a length-adjusted copy without touching the
/// registry.
pub fn for_spec(spec: &str) -> Result<Arc<InformationElement>, IpfixError> {
    let raw = parse_spec(spec)?;

    if let Some(type_name) = &raw.type_name {
        let ie_type = IeType::from_name(type_name).ok_or_else(|| IpfixError::InvalidSpec {
            spec: spec.to_string(),
            context: format!("unknown abstract data type {type_name:?}"),
        })?;
        let (Some(name), Some(num)) = (raw.name.clone(), raw.num) else {
            return Err(IpfixError::InvalidSpec {
                spec: spec.to_string(),
                context: "registering an element requires both a name and a number".to_string(),
            });
        };
        let length = raw.size.unwrap_or_else(|| ie_type.natural_length());
        let ie = InformationElement::new(name, raw.pen, num, ie_type, length)?;
        return Ok(write_model().add(ie));
    }

    let found = {
        let model = read_model();
        match raw.num {
            Some(num) => model.get(raw.pen, num).cloned(),
            None => raw.name.as_deref().and_then(|n| model.get_by_name(n)).cloned(),
        }
    };
    let ie = found.ok_or_else(|| IpfixError::InvalidSpec {
        spec: spec.to_string(),
        context: "no such element registered".to_string(),
    })?;
    match raw.size {
        Some(size) if size != ie.length => Ok(Arc::new(ie.for_length(size)?)),
        _ => Ok(ie),
    }
}

/// Resolves a template field specifier during decoding; never fails.
///
/// Known elements come back as-is or as a length-adjusted copy. Unknown
/// elements are synthesized as `_ipfix_<pen>_<num>` octetArray placeholders
/// and registered so later templates share the handle.
pub fn for_template_entry(pen: u32, num: u16, length: u16) -> Arc<InformationElement> {
    {
        let model = read_model();
        if let Some(ie) = model.get(pen, num) {
            if ie.length == length {
                return Arc::clone(ie);
            }
            return match ie.for_length(length) {
                Ok(adjusted) => Arc::new(adjusted),
                // A length the type cannot carry: decode the octets opaquely.
                Err(_) => Arc::new(InformationElement::raw(
                    ie.name.clone(),
                    pen,
                    num,
                    IeType::OctetArray,
                    length,
                )),
            };
        }
    }
    let placeholder =
        InformationElement::raw(format!("_ipfix_{pen}_{num}"), pen, num, IeType::OctetArray, length);
    write_model().add(placeholder)
}

/// Loads the bundled subset of the IANA IPFIX registry.
pub fn use_iana_default() {
    let mut model = write_model();
    for &(num, name, ie_type, length) in iana::IANA_IES {
        model.add(InformationElement::raw(name, 0, num, ie_type, length));
    }
}

/// Loads the IANA subset plus the RFC 5103 reverse elements, derived by
/// moving each reversible element under PEN 29305 with a `reverse` prefix.
pub fn use_5103_default() {
    use_iana_default();
    let mut model = write_model();
    for &(num, name, ie_type, length) in iana::IANA_IES {
        if iana::NON_REVERSIBLE.contains(&num) {
            continue;
        }
        model.add(InformationElement::raw(
            reverse_name(name),
            REVERSE_PEN,
            num,
            ie_type,
            length,
        ));
    }
}

fn reverse_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 7);
    out.push_str("reverse");
    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    }
    out
}

/// Loads registry entries from a file of IESpecs, one per line. Blank lines
/// and lines starting with `#` are skipped.
pub fn use_specfile(path: impl AsRef<std::path::Path>) -> Result<(), IpfixError> {
    let text = std::fs::read_to_string(path.as_ref()).map_err(|e| IpfixError::Io {
        context: format!("reading specfile {}: {e}", path.as_ref().display()),
    })?;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for_spec(line)?;
    }
    Ok(())
}

/// Empties the registry. Intended for tests and full reloads; templates
/// already holding element handles are unaffected.
pub fn clear_infomodel() {
    write_model().clear();
}

/// Parses a list of IESpecs into an ordered element list suitable for
/// template construction or as a tuple projection key.
pub fn spec_list<I, S>(specs: I) -> Result<IeList, IpfixError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    specs.into_iter().map(|s| for_spec(s.as_ref())).collect()
}
