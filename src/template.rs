//! Templates and their compiled packing plans.
//!
//! References:
//! - <https://datatracker.ietf.org/doc/html/rfc7011#section-3.4.1>
//! - <https://datatracker.ietf.org/doc/html/rfc7011#section-8> (withdrawals)
//!
//! A template is an ordered list of Information Elements under a 16-bit
//! template ID, finalized at construction. Record encoding and decoding run
//! off a [`PackPlan`]: contiguous fixed-length fields are sliced as one run
//! and picked apart at precomputed offsets, variable-length fields are
//! handled as singletons with their one- or three-octet length prefix.
//! Plans for tuple projections are cached per template, keyed by the
//! projection's element identities.

use crate::IpfixError;
use crate::infomodel::{self, IeList, InformationElement};
use crate::types::{FieldValue, parse_varlen_length, write_varlen_length};

use lru::LruCache;
use nom::Err as NomErr;
use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::{be_u16, be_u32};
use nom::IResult;
use serde::Serialize;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::sync::Arc;

/// Set ID reserved for Template Sets.
pub const TEMPLATE_SET_ID: u16 = 2;
/// Set ID reserved for Options Template Sets.
pub const OPTIONS_SET_ID: u16 = 3;
/// Lowest set ID (and template ID) available for Data Sets.
pub const MIN_DATA_SET_ID: u16 = 256;
/// Top bit of a field specifier ID, set when an enterprise number follows.
pub const ENTERPRISE_BIT: u16 = 0x8000;

/// Plans cached per template; distinct projections beyond this are rare.
const PLAN_CACHE_CAP: NonZeroUsize = NonZeroUsize::new(32).unwrap();

type ProjectionKey = Vec<(u32, u16)>;

/// A compiled traversal of a template for one projection of its elements.
#[derive(Debug)]
pub struct PackPlan {
    steps: Vec<PlanStep>,
    slots: usize,
    varlen: bool,
    complete: bool,
    covers_projection: bool,
}

#[derive(Debug)]
enum PlanStep {
    /// Contiguous fixed-length fields read or written as one slice.
    FixedRun { octets: usize, fields: Vec<PlanField> },
    /// A variable-length field with its own length prefix.
    Varlen {
        ie: Arc<InformationElement>,
        slot: Option<usize>,
    },
}

#[derive(Debug)]
struct PlanField {
    ie: Arc<InformationElement>,
    offset: usize,
    slot: Option<usize>,
}

impl PackPlan {
    fn compile(ies: &IeList, projection: Option<&IeList>) -> PackPlan {
        let slots = projection.map_or(ies.len(), Vec::len);
        let mut covered = vec![false; slots];
        let mut steps = Vec::new();
        let mut run_fields: Vec<PlanField> = Vec::new();
        let mut run_octets = 0usize;
        let mut varlen = false;
        let mut complete = true;

        for (index, ie) in ies.iter().enumerate() {
            let slot = match projection {
                None => Some(index),
                Some(list) => list
                    .iter()
                    .position(|p| p.pen == ie.pen && p.num == ie.num)
                    .filter(|s| !covered[*s]),
            };
            if let Some(s) = slot {
                covered[s] = true;
            } else {
                complete = false;
            }
            if ie.is_varlen() {
                if !run_fields.is_empty() {
                    steps.push(PlanStep::FixedRun {
                        octets: run_octets,
                        fields: std::mem::take(&mut run_fields),
                    });
                    run_octets = 0;
                }
                varlen |= slot.is_some();
                steps.push(PlanStep::Varlen {
                    ie: Arc::clone(ie),
                    slot,
                });
            } else {
                run_fields.push(PlanField {
                    ie: Arc::clone(ie),
                    offset: run_octets,
                    slot,
                });
                run_octets += usize::from(ie.length);
            }
        }
        if !run_fields.is_empty() {
            steps.push(PlanStep::FixedRun {
                octets: run_octets,
                fields: run_fields,
            });
        }

        PackPlan {
            steps,
            slots,
            varlen,
            complete,
            covers_projection: covered.iter().all(|c| *c),
        }
    }

    /// Number of values a decoded record yields under this plan.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Whether any projected field is variable-length (no contiguous fast path).
    pub fn is_varlen(&self) -> bool {
        self.varlen
    }

    /// Whether every element of the projection occurs in the template. Sets
    /// whose template cannot satisfy a projection are skipped wholesale.
    pub fn covers_projection(&self) -> bool {
        self.covers_projection
    }

    /// First template element the projection leaves without a value, if any.
    /// Encoding through an incomplete plan fails with missing-field.
    fn first_missing(&self) -> Option<&Arc<InformationElement>> {
        self.steps.iter().find_map(|step| match step {
            PlanStep::FixedRun { fields, .. } => {
                fields.iter().find(|f| f.slot.is_none()).map(|f| &f.ie)
            }
            PlanStep::Varlen { ie, slot: None } => Some(ie),
            PlanStep::Varlen { .. } => None,
        })
    }
}

/// An ordered list of Information Elements with a 16-bit template ID.
///
/// `scope_count > 0` makes this an options template whose leading elements
/// are scope fields. An empty element list is the wire form of a template
/// withdrawal for `tid`.
#[derive(Serialize)]
pub struct Template {
    tid: u16,
    scope_count: u16,
    ies: IeList,
    #[serde(skip)]
    fixlen_count: usize,
    #[serde(skip)]
    fixlen_octets: u16,
    #[serde(skip)]
    min_record_len: usize,
    #[serde(skip)]
    plan: Rc<PackPlan>,
    #[serde(skip)]
    plan_cache: RefCell<LruCache<ProjectionKey, Rc<PackPlan>>>,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("tid", &self.tid)
            .field("scope_count", &self.scope_count)
            .field("ies", &self.ies)
            .finish()
    }
}

impl Clone for Template {
    fn clone(&self) -> Self {
        Self {
            tid: self.tid,
            scope_count: self.scope_count,
            ies: self.ies.clone(),
            fixlen_count: self.fixlen_count,
            fixlen_octets: self.fixlen_octets,
            min_record_len: self.min_record_len,
            plan: Rc::clone(&self.plan),
            plan_cache: RefCell::new(LruCache::new(PLAN_CACHE_CAP)),
        }
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.tid == other.tid
            && self.scope_count == other.scope_count
            && self.ies == other.ies
    }
}

impl Template {
    /// Builds a finalized template from an ordered element list.
    pub fn from_ielist(tid: u16, ies: IeList) -> Result<Self, IpfixError> {
        Self::from_parts(tid, 0, ies)
    }

    /// Builds a finalized options template; the scope elements come first.
    pub fn options_from_ielists(
        tid: u16,
        scope_ies: IeList,
        option_ies: IeList,
    ) -> Result<Self, IpfixError> {
        if scope_ies.is_empty() {
            return Err(IpfixError::Malformed {
                offset: 0,
                context: format!("options template {tid} with zero scope fields"),
            });
        }
        let scope_count = scope_ies.len() as u16;
        let mut ies = scope_ies;
        ies.extend(option_ies);
        Self::from_parts(tid, scope_count, ies)
    }

    pub(crate) fn withdrawal(tid: u16) -> Self {
        let ies = Vec::new();
        let plan = Rc::new(PackPlan::compile(&ies, None));
        Self {
            tid,
            scope_count: 0,
            ies,
            fixlen_count: 0,
            fixlen_octets: 0,
            min_record_len: 0,
            plan,
            plan_cache: RefCell::new(LruCache::new(PLAN_CACHE_CAP)),
        }
    }

    fn from_parts(tid: u16, scope_count: u16, ies: IeList) -> Result<Self, IpfixError> {
        if usize::from(scope_count) > ies.len() {
            return Err(IpfixError::Malformed {
                offset: 0,
                context: format!(
                    "template {tid} scope count {scope_count} exceeds field count {}",
                    ies.len()
                ),
            });
        }
        let fixlen_count = ies.iter().take_while(|ie| !ie.is_varlen()).count();
        let fixlen_octets = ies[..fixlen_count]
            .iter()
            .map(|ie| u32::from(ie.length))
            .sum::<u32>() as u16;
        let min_record_len = ies
            .iter()
            .map(|ie| if ie.is_varlen() { 1 } else { usize::from(ie.length) })
            .sum();
        let plan = Rc::new(PackPlan::compile(&ies, None));
        Ok(Self {
            tid,
            scope_count,
            ies,
            fixlen_count,
            fixlen_octets,
            min_record_len,
            plan,
            plan_cache: RefCell::new(LruCache::new(PLAN_CACHE_CAP)),
        })
    }

    pub fn tid(&self) -> u16 {
        self.tid
    }

    pub fn scope_count(&self) -> u16 {
        self.scope_count
    }

    pub fn ies(&self) -> &IeList {
        &self.ies
    }

    pub fn is_options(&self) -> bool {
        self.scope_count > 0
    }

    /// A template record with field count zero withdraws its template ID.
    pub fn is_withdrawal(&self) -> bool {
        self.ies.is_empty()
    }

    /// Number of leading fixed-length elements.
    pub fn fixlen_count(&self) -> usize {
        self.fixlen_count
    }

    /// Total octets of the leading fixed-length elements.
    pub fn fixlen_octets(&self) -> u16 {
        self.fixlen_octets
    }

    /// Smallest possible record: all fixed lengths plus one prefix octet per
    /// variable-length element. Trailing set padding must stay below this.
    pub fn min_record_len(&self) -> usize {
        self.min_record_len
    }

    /// The set this template is published in: 3 for options templates.
    pub fn set_id(&self) -> u16 {
        if self.is_options() { OPTIONS_SET_ID } else { TEMPLATE_SET_ID }
    }

    /// The precompiled plan over the full element list in template order.
    pub fn full_plan(&self) -> Rc<PackPlan> {
        Rc::clone(&self.plan)
    }

    /// Returns the cached plan mapping `ielist` onto this template's record
    /// layout, compiling it on first use.
    pub fn packplan_for_ielist(&self, ielist: &IeList) -> Rc<PackPlan> {
        let key: ProjectionKey = ielist.iter().map(|ie| (ie.pen, ie.num)).collect();
        let mut cache = self.plan_cache.borrow_mut();
        if let Some(plan) = cache.get(&key) {
            return Rc::clone(plan);
        }
        let plan = Rc::new(PackPlan::compile(&self.ies, Some(ielist)));
        cache.put(key, Rc::clone(&plan));
        plan
    }

    /// Serializes the template record (or withdrawal) for `set_id` 2 or 3.
    pub fn encode_template_to(&self, out: &mut Vec<u8>, set_id: u16) -> Result<(), IpfixError> {
        if set_id != TEMPLATE_SET_ID && set_id != OPTIONS_SET_ID {
            return Err(IpfixError::Malformed {
                offset: 0,
                context: format!("template records do not belong in set {set_id}"),
            });
        }
        out.extend_from_slice(&self.tid.to_be_bytes());
        out.extend_from_slice(&(self.ies.len() as u16).to_be_bytes());
        if self.is_withdrawal() {
            return Ok(());
        }
        if set_id == OPTIONS_SET_ID {
            if self.scope_count == 0 {
                return Err(IpfixError::Malformed {
                    offset: 0,
                    context: format!("template {} has no scope fields for set 3", self.tid),
                });
            }
            out.extend_from_slice(&self.scope_count.to_be_bytes());
        }
        for ie in &self.ies {
            if ie.pen != 0 {
                out.extend_from_slice(&(ie.num | ENTERPRISE_BIT).to_be_bytes());
                out.extend_from_slice(&ie.length.to_be_bytes());
                out.extend_from_slice(&ie.pen.to_be_bytes());
            } else {
                out.extend_from_slice(&ie.num.to_be_bytes());
                out.extend_from_slice(&ie.length.to_be_bytes());
            }
        }
        Ok(())
    }

    /// Parses one template record from the body of set `set_id`, resolving
    /// each field specifier against the information model. A field count of
    /// zero yields a withdrawal.
    pub fn decode_from(i: &[u8], set_id: u16) -> IResult<&[u8], Template> {
        let (rest, tid) = be_u16(i)?;
        let (rest, field_count) = be_u16(rest)?;
        if tid < MIN_DATA_SET_ID {
            return Err(NomErr::Error(NomError::new(i, ErrorKind::Fail)));
        }
        if field_count == 0 {
            return Ok((rest, Template::withdrawal(tid)));
        }
        let (mut rest, scope_count) = if set_id == OPTIONS_SET_ID {
            let (rest, scope_count) = be_u16(rest)?;
            if scope_count == 0 || scope_count > field_count {
                return Err(NomErr::Error(NomError::new(i, ErrorKind::Fail)));
            }
            (rest, scope_count)
        } else {
            (rest, 0)
        };
        let mut ies = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            let (r, raw_id) = be_u16(rest)?;
            let (r, length) = be_u16(r)?;
            let (r, pen) = if raw_id & ENTERPRISE_BIT != 0 {
                be_u32(r)?
            } else {
                (r, 0)
            };
            ies.push(infomodel::for_template_entry(pen, raw_id & !ENTERPRISE_BIT, length));
            rest = r;
        }
        match Template::from_parts(tid, scope_count, ies) {
            Ok(template) => Ok((rest, template)),
            Err(_) => Err(NomErr::Error(NomError::new(i, ErrorKind::Fail))),
        }
    }

    /// Encodes one record. `values` runs parallel to the plan's projection
    /// (template order when `plan` is `None`); every template element must be
    /// covered or the encode fails with missing-field.
    pub fn encode_record_to(
        &self,
        out: &mut Vec<u8>,
        values: &[FieldValue],
        plan: Option<&PackPlan>,
    ) -> Result<(), IpfixError> {
        let plan = plan.unwrap_or(&self.plan);
        if !plan.complete {
            let name = plan
                .first_missing()
                .map_or_else(String::new, |ie| ie.name.clone());
            return Err(IpfixError::MissingField { name });
        }
        for step in &plan.steps {
            match step {
                PlanStep::FixedRun { fields, .. } => {
                    for field in fields {
                        let value = self.value_for(values, field.slot, &field.ie)?;
                        out.extend(value.to_wire(field.ie.ie_type, field.ie.length)?);
                    }
                }
                PlanStep::Varlen { ie, slot } => {
                    let value = self.value_for(values, *slot, ie)?;
                    let body = value.to_wire(ie.ie_type, crate::types::VARLEN)?;
                    write_varlen_length(body.len(), out)?;
                    out.extend(body);
                }
            }
        }
        Ok(())
    }

    fn value_for<'v>(
        &self,
        values: &'v [FieldValue],
        slot: Option<usize>,
        ie: &InformationElement,
    ) -> Result<&'v FieldValue, IpfixError> {
        slot.and_then(|s| values.get(s))
            .ok_or_else(|| IpfixError::MissingField {
                name: ie.name.clone(),
            })
    }

    /// Decodes one record under `plan`, yielding values in projection order.
    pub fn decode_record_from<'a>(
        &self,
        i: &'a [u8],
        plan: &PackPlan,
    ) -> IResult<&'a [u8], Vec<FieldValue>> {
        let mut out: Vec<(usize, FieldValue)> = Vec::with_capacity(plan.slots);
        let mut rest = i;
        for step in &plan.steps {
            match step {
                PlanStep::FixedRun { octets, fields } => {
                    let (r, run) = take(*octets)(rest)?;
                    rest = r;
                    for field in fields {
                        let Some(slot) = field.slot else { continue };
                        let (_, value) = FieldValue::from_wire(
                            &run[field.offset..],
                            field.ie.ie_type,
                            field.ie.length,
                        )?;
                        out.push((slot, value));
                    }
                }
                PlanStep::Varlen { ie, slot } => {
                    let (r, length) = parse_varlen_length(rest)?;
                    let (r, body) = take(usize::from(length))(r)?;
                    rest = r;
                    if let Some(slot) = slot {
                        let (_, value) = FieldValue::from_wire(body, ie.ie_type, length)?;
                        out.push((*slot, value));
                    }
                }
            }
        }
        out.sort_unstable_by_key(|(slot, _)| *slot);
        Ok((rest, out.into_iter().map(|(_, value)| value).collect()))
    }

    /// Encodes a record given as a name-to-value mapping. Extra keys are
    /// ignored; a template element without a value is missing-field.
    pub fn encode_namedict_to(
        &self,
        out: &mut Vec<u8>,
        rec: &BTreeMap<String, FieldValue>,
    ) -> Result<(), IpfixError> {
        let values = self
            .ies
            .iter()
            .map(|ie| {
                rec.get(&ie.name).cloned().ok_or_else(|| IpfixError::MissingField {
                    name: ie.name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.encode_record_to(out, &values, None)
    }

    /// Encodes a record given as a value sequence. With an `ielist`, `rec[i]`
    /// corresponds to `ielist[i]`; projection entries the template lacks are
    /// ignored, template elements the projection lacks are missing-field.
    pub fn encode_tuple_to(
        &self,
        out: &mut Vec<u8>,
        rec: &[FieldValue],
        ielist: Option<&IeList>,
    ) -> Result<(), IpfixError> {
        match ielist {
            None => self.encode_record_to(out, rec, None),
            Some(list) => {
                let plan = self.packplan_for_ielist(list);
                self.encode_record_to(out, rec, Some(&plan))
            }
        }
    }

    /// Decodes one record into a name-to-value mapping.
    pub fn decode_namedict_from<'a>(
        &self,
        i: &'a [u8],
    ) -> IResult<&'a [u8], BTreeMap<String, FieldValue>> {
        let (rest, values) = self.decode_record_from(i, &self.plan)?;
        let rec = self
            .ies
            .iter()
            .map(|ie| ie.name.clone())
            .zip(values)
            .collect();
        Ok((rest, rec))
    }

    /// Decodes one record into an element-handle-to-value mapping.
    pub fn decode_iedict_from<'a>(
        &self,
        i: &'a [u8],
    ) -> IResult<&'a [u8], BTreeMap<Arc<InformationElement>, FieldValue>> {
        let (rest, values) = self.decode_record_from(i, &self.plan)?;
        let rec = self.ies.iter().map(Arc::clone).zip(values).collect();
        Ok((rest, rec))
    }

    /// Decodes one record projected onto `ielist`, in `ielist` order.
    pub fn decode_tuple_from<'a>(
        &self,
        i: &'a [u8],
        ielist: &IeList,
    ) -> IResult<&'a [u8], Vec<FieldValue>> {
        let plan = self.packplan_for_ielist(ielist);
        self.decode_record_from(i, &plan)
    }
}
