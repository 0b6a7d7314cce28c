//! The IPFIX message buffer: framing, template state, and MTU accounting.
//!
//! References:
//! - <https://datatracker.ietf.org/doc/html/rfc7011#section-3.1>
//! - <https://datatracker.ietf.org/doc/html/rfc7011#section-10>
//!
//! One [`MessageBuffer`] builds or consumes one message at a time. Exporting
//! appends sets and records under an MTU bound, patching set and message
//! headers at finalization; any append that would exceed the MTU fails with
//! end-of-message and leaves the buffer byte-identical, so the caller can
//! finalize and retry the record in the next message. Decoding scans the set
//! structure up front, then iterates records single-pass, learning templates
//! as template sets are encountered.
//!
//! Templates are scoped to the observation domain: the table is keyed by
//! `(odid, template id)` and survives across messages, as RFC 7011 requires
//! for session-long template state.

use crate::IpfixError;
use crate::infomodel::{IeList, InformationElement};
use crate::template::{
    MIN_DATA_SET_ID, OPTIONS_SET_ID, PackPlan, TEMPLATE_SET_ID, Template,
};
use crate::types::FieldValue;

use nom_derive::{Nom, Parse};

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Version field of every IPFIX message.
pub const IPFIX_VERSION: u16 = 10;
/// Octets of the fixed message header.
pub const MESSAGE_HEADER_LEN: usize = 16;
/// Octets of a set header.
pub const SET_HEADER_LEN: usize = 4;
/// Largest (and default) message size; the length field is 16 bits.
pub const DEFAULT_MTU: usize = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Nom)]
struct MessageHeader {
    version: u16,
    length: u16,
    export_time: u32,
    sequence: u32,
    observation_domain_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferState {
    Idle,
    Writing,
    Finalized,
    Reading,
}

#[derive(Debug, Clone, Copy)]
struct SetEntry {
    set_id: u16,
    off: usize,
    len: usize,
}

/// Encodes flow records into and decodes them from one IPFIX message.
#[derive(Debug)]
pub struct MessageBuffer {
    buffer: Vec<u8>,
    mtu: usize,
    odid: u32,
    export_time: Option<u32>,
    sequences: HashMap<u32, u32>,
    templates: BTreeMap<(u32, u16), Rc<Template>>,
    state: BufferState,
    cur_set_id: u16,
    cur_set_off: usize,
    data_count: u32,
    setlist: Vec<SetEntry>,
    read_export_time: u32,
    read_sequence: u32,
    read_set: usize,
    read_off: usize,
    read_plan: Option<(Rc<Template>, Rc<PackPlan>)>,
    read_errored: bool,
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::with_mtu(DEFAULT_MTU)
    }

    /// A buffer whose messages never exceed `mtu` octets (capped at 65535).
    pub fn with_mtu(mtu: usize) -> Self {
        Self {
            buffer: Vec::new(),
            mtu: mtu.min(DEFAULT_MTU),
            odid: 0,
            export_time: None,
            sequences: HashMap::new(),
            templates: BTreeMap::new(),
            state: BufferState::Idle,
            cur_set_id: 0,
            cur_set_off: 0,
            data_count: 0,
            setlist: Vec::new(),
            read_export_time: 0,
            read_sequence: 0,
            read_set: 0,
            read_off: 0,
            read_plan: None,
            read_errored: false,
        }
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// The current observation domain ID (set by [`begin_export`] or taken
    /// from the last decoded message header).
    ///
    /// [`begin_export`]: MessageBuffer::begin_export
    pub fn odid(&self) -> u32 {
        self.odid
    }

    /// Pins the export time written into finalized headers. Without an
    /// explicit time the wall clock at finalization is used.
    pub fn set_export_time(&mut self, secs: u32) {
        self.export_time = Some(secs);
    }

    /// Export time of the message being read, or the pinned export time.
    pub fn export_time(&self) -> Option<u32> {
        match self.state {
            BufferState::Reading => Some(self.read_export_time),
            _ => self.export_time,
        }
    }

    /// Sequence number: of the message being read, or the value the next
    /// finalized message in the current domain will carry.
    pub fn sequence(&self) -> u32 {
        match self.state {
            BufferState::Reading => self.read_sequence,
            _ => self.sequences.get(&self.odid).copied().unwrap_or(0),
        }
    }

    /// Template IDs known in the current observation domain, ascending.
    pub fn template_ids(&self) -> Vec<u16> {
        self.templates
            .range((self.odid, 0)..=(self.odid, u16::MAX))
            .map(|((_, tid), _)| *tid)
            .collect()
    }

    pub fn get_template(&self, tid: u16) -> Option<Rc<Template>> {
        self.templates.get(&(self.odid, tid)).cloned()
    }

    fn require_writing(&self, operation: &'static str) -> Result<(), IpfixError> {
        if self.state != BufferState::Writing {
            return Err(IpfixError::WrongState {
                operation,
                state: format!("{:?}", self.state),
            });
        }
        Ok(())
    }

    /// Fails with end-of-message unless `additional` more octets fit.
    fn check_room(&self, additional: usize) -> Result<(), IpfixError> {
        let required = self.buffer.len() + additional;
        if required > self.mtu {
            return Err(IpfixError::EndOfMessage {
                required,
                available: self.mtu,
            });
        }
        Ok(())
    }

    fn close_current_set(&mut self) {
        if self.cur_set_id != 0 {
            let len = (self.buffer.len() - self.cur_set_off) as u16;
            self.buffer[self.cur_set_off + 2..self.cur_set_off + 4]
                .copy_from_slice(&len.to_be_bytes());
            self.cur_set_id = 0;
        }
    }

    fn open_set(&mut self, set_id: u16) {
        self.close_current_set();
        self.cur_set_off = self.buffer.len();
        self.buffer.extend_from_slice(&set_id.to_be_bytes());
        self.buffer.extend_from_slice(&[0, 0]);
        self.cur_set_id = set_id;
    }

    /// Starts a new message: clears the buffer, writes a stub header, and
    /// switches the observation domain if one is given.
    pub fn begin_export(&mut self, odid: Option<u32>) -> Result<(), IpfixError> {
        if self.mtu < MESSAGE_HEADER_LEN {
            return Err(IpfixError::EndOfMessage {
                required: MESSAGE_HEADER_LEN,
                available: self.mtu,
            });
        }
        if let Some(odid) = odid {
            self.odid = odid;
        }
        self.buffer.clear();
        self.buffer.resize(MESSAGE_HEADER_LEN, 0);
        self.buffer[0..2].copy_from_slice(&IPFIX_VERSION.to_be_bytes());
        self.state = BufferState::Writing;
        self.cur_set_id = 0;
        self.cur_set_off = 0;
        self.data_count = 0;
        self.setlist.clear();
        self.read_plan = None;
        Ok(())
    }

    /// Registers `template` in the current domain; with `export` its record
    /// is also appended to the open template (or options template) set.
    pub fn add_template(&mut self, template: Template, export: bool) -> Result<(), IpfixError> {
        self.require_writing("add_template")?;
        if template.tid() < MIN_DATA_SET_ID {
            return Err(IpfixError::Malformed {
                offset: 0,
                context: format!("template ID {} is reserved", template.tid()),
            });
        }
        if template.is_withdrawal() {
            return Err(IpfixError::Malformed {
                offset: 0,
                context: format!("template {} has no fields", template.tid()),
            });
        }
        if export {
            let set_id = template.set_id();
            let mut body = Vec::new();
            template.encode_template_to(&mut body, set_id)?;
            let header = if self.cur_set_id == set_id { 0 } else { SET_HEADER_LEN };
            self.check_room(header + body.len())?;
            if self.cur_set_id != set_id {
                self.open_set(set_id);
            }
            self.buffer.extend(body);
        }
        self.templates
            .insert((self.odid, template.tid()), Rc::new(template));
        Ok(())
    }

    /// Removes `tid` from the current domain; with `export` a Template
    /// Withdrawal is appended to the matching template set first.
    pub fn delete_template(&mut self, tid: u16, export: bool) -> Result<(), IpfixError> {
        self.require_writing("delete_template")?;
        let set_id = self
            .templates
            .get(&(self.odid, tid))
            .map(|t| t.set_id())
            .ok_or(IpfixError::TemplateNotFound {
                template_id: tid,
                observation_domain_id: self.odid,
            })?;
        if export {
            let mut body = Vec::new();
            Template::withdrawal(tid).encode_template_to(&mut body, set_id)?;
            let header = if self.cur_set_id == set_id { 0 } else { SET_HEADER_LEN };
            self.check_room(header + body.len())?;
            if self.cur_set_id != set_id {
                self.open_set(set_id);
            }
            self.buffer.extend(body);
        }
        self.templates.remove(&(self.odid, tid));
        Ok(())
    }

    /// Opens a set with ID `tid` unless it is already the current set. Data
    /// set IDs must name a template known in the current domain.
    pub fn export_ensure_set(&mut self, tid: u16) -> Result<(), IpfixError> {
        self.require_writing("export_ensure_set")?;
        self.ensure_known(tid)?;
        if self.cur_set_id != tid {
            self.check_room(SET_HEADER_LEN)?;
            self.open_set(tid);
        }
        Ok(())
    }

    /// Closes the current set and opens a fresh one with ID `tid`, even when
    /// the IDs match.
    pub fn export_new_set(&mut self, tid: u16) -> Result<(), IpfixError> {
        self.require_writing("export_new_set")?;
        self.ensure_known(tid)?;
        self.check_room(SET_HEADER_LEN)?;
        self.open_set(tid);
        Ok(())
    }

    fn ensure_known(&self, tid: u16) -> Result<(), IpfixError> {
        if tid >= MIN_DATA_SET_ID && !self.templates.contains_key(&(self.odid, tid)) {
            return Err(IpfixError::TemplateNotFound {
                template_id: tid,
                observation_domain_id: self.odid,
            });
        }
        Ok(())
    }

    fn current_data_template(&self) -> Result<Rc<Template>, IpfixError> {
        if self.cur_set_id < MIN_DATA_SET_ID {
            return Err(IpfixError::WrongState {
                operation: "export_record",
                state: format!("current set is {}, not a data set", self.cur_set_id),
            });
        }
        self.templates
            .get(&(self.odid, self.cur_set_id))
            .cloned()
            .ok_or(IpfixError::TemplateNotFound {
                template_id: self.cur_set_id,
                observation_domain_id: self.odid,
            })
    }

    fn append_record(&mut self, body: Vec<u8>) -> Result<(), IpfixError> {
        self.check_room(body.len())?;
        self.buffer.extend(body);
        self.data_count = self.data_count.wrapping_add(1);
        Ok(())
    }

    /// Exports one record, given as a name-to-value mapping, into the open
    /// data set. On end-of-message the buffer is left untouched so the
    /// caller can finalize and retry.
    pub fn export_namedict(
        &mut self,
        rec: &BTreeMap<String, FieldValue>,
    ) -> Result<(), IpfixError> {
        self.require_writing("export_namedict")?;
        let template = self.current_data_template()?;
        let mut body = Vec::new();
        template.encode_namedict_to(&mut body, rec)?;
        self.append_record(body)
    }

    /// Exports one record given as a value sequence, optionally reordered
    /// through `ielist` (see [`Template::encode_tuple_to`]).
    pub fn export_tuple(
        &mut self,
        rec: &[FieldValue],
        ielist: Option<&IeList>,
    ) -> Result<(), IpfixError> {
        self.require_writing("export_tuple")?;
        let template = self.current_data_template()?;
        let mut body = Vec::new();
        template.encode_tuple_to(&mut body, rec, ielist)?;
        self.append_record(body)
    }

    /// Finalizes the message: closes the open set, patches the header, and
    /// advances the domain's sequence counter by the data records exported.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, IpfixError> {
        self.require_writing("to_bytes")?;
        self.close_current_set();
        let length = self.buffer.len() as u16;
        let export_time = self.export_time.unwrap_or_else(now_secs);
        let sequence = self.sequences.get(&self.odid).copied().unwrap_or(0);
        self.buffer[2..4].copy_from_slice(&length.to_be_bytes());
        self.buffer[4..8].copy_from_slice(&export_time.to_be_bytes());
        self.buffer[8..12].copy_from_slice(&sequence.to_be_bytes());
        self.buffer[12..16].copy_from_slice(&self.odid.to_be_bytes());
        self.sequences
            .insert(self.odid, sequence.wrapping_add(self.data_count));
        self.state = BufferState::Finalized;
        Ok(self.buffer.clone())
    }

    /// Finalizes the message and writes it to `writer`, returning the octet
    /// count.
    pub fn write_message<W: Write>(&mut self, writer: &mut W) -> Result<usize, IpfixError> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes).map_err(|e| IpfixError::Io {
            context: format!("writing message: {e}"),
        })?;
        Ok(bytes.len())
    }

    /// Loads one message for decoding: verifies the header, stores its
    /// fields, and indexes the sets. Template state from earlier messages is
    /// kept.
    pub fn from_bytes(&mut self, bytes: &[u8]) -> Result<(), IpfixError> {
        let (_, header) =
            MessageHeader::parse(bytes).map_err(|_| IpfixError::Malformed {
                offset: 0,
                context: "truncated message header".to_string(),
            })?;
        if header.version != IPFIX_VERSION {
            return Err(IpfixError::Malformed {
                offset: 0,
                context: format!("version {} is not IPFIX", header.version),
            });
        }
        let length = usize::from(header.length);
        if length < MESSAGE_HEADER_LEN || length > bytes.len() {
            return Err(IpfixError::Malformed {
                offset: 2,
                context: format!(
                    "message length {length} outside {MESSAGE_HEADER_LEN}..={}",
                    bytes.len()
                ),
            });
        }
        self.setlist.clear();
        let mut off = MESSAGE_HEADER_LEN;
        while off < length {
            if off + SET_HEADER_LEN > length {
                return Err(IpfixError::Malformed {
                    offset: off,
                    context: "set header runs past the message".to_string(),
                });
            }
            let set_id = u16::from_be_bytes([bytes[off], bytes[off + 1]]);
            let set_len = usize::from(u16::from_be_bytes([bytes[off + 2], bytes[off + 3]]));
            if set_len < SET_HEADER_LEN || off + set_len > length {
                return Err(IpfixError::Malformed {
                    offset: off,
                    context: format!("set {set_id} with length {set_len} runs past the message"),
                });
            }
            self.setlist.push(SetEntry {
                set_id,
                off: off + SET_HEADER_LEN,
                len: set_len - SET_HEADER_LEN,
            });
            off += set_len;
        }
        self.buffer.clear();
        self.buffer.extend_from_slice(&bytes[..length]);
        self.odid = header.observation_domain_id;
        self.read_export_time = header.export_time;
        self.read_sequence = header.sequence;
        self.state = BufferState::Reading;
        self.cur_set_id = 0;
        self.data_count = 0;
        self.read_set = 0;
        self.read_off = 0;
        self.read_plan = None;
        self.read_errored = false;
        Ok(())
    }

    /// Reads one message from `reader` (header first, then the remainder the
    /// header's length announces) and loads it as [`from_bytes`] does.
    ///
    /// [`from_bytes`]: MessageBuffer::from_bytes
    pub fn read_message<R: Read>(&mut self, reader: &mut R) -> Result<(), IpfixError> {
        let mut header = [0u8; MESSAGE_HEADER_LEN];
        reader.read_exact(&mut header).map_err(|e| IpfixError::Io {
            context: format!("reading message header: {e}"),
        })?;
        let length = usize::from(u16::from_be_bytes([header[2], header[3]]));
        if length < MESSAGE_HEADER_LEN {
            return Err(IpfixError::Malformed {
                offset: 2,
                context: format!("message length {length} below the header size"),
            });
        }
        let mut bytes = header.to_vec();
        bytes.resize(length, 0);
        reader
            .read_exact(&mut bytes[MESSAGE_HEADER_LEN..])
            .map_err(|e| IpfixError::Io {
                context: format!("reading message body: {e}"),
            })?;
        self.from_bytes(&bytes)
    }

    fn ingest_template_set(&mut self, entry: SetEntry) -> Result<(), IpfixError> {
        let odid = self.odid;
        let buffer = &self.buffer;
        let templates = &mut self.templates;
        let mut body = &buffer[entry.off..entry.off + entry.len];
        // A template record is at least four octets; anything shorter is padding.
        while body.len() >= 4 {
            match Template::decode_from(body, entry.set_id) {
                Ok((rest, template)) => {
                    body = rest;
                    if template.is_withdrawal() {
                        templates.remove(&(odid, template.tid()));
                    } else {
                        templates.insert((odid, template.tid()), Rc::new(template));
                    }
                }
                Err(_) => {
                    return Err(IpfixError::Malformed {
                        offset: entry.off,
                        context: format!("template record in set {}", entry.set_id),
                    });
                }
            }
        }
        Ok(())
    }

    /// Advances the single-pass record cursor. Yields the owning template and
    /// the record's values (projection order when a projection is given).
    /// Template sets are ingested as they are passed; data sets with unknown
    /// templates, and sets whose template cannot satisfy the projection, are
    /// skipped.
    fn next_decoded(
        &mut self,
        projection: Option<&IeList>,
    ) -> Option<Result<(Rc<Template>, Vec<FieldValue>), IpfixError>> {
        if self.state != BufferState::Reading || self.read_errored {
            return None;
        }
        loop {
            let entry = *self.setlist.get(self.read_set)?;
            if self.read_off == 0 {
                match entry.set_id {
                    TEMPLATE_SET_ID | OPTIONS_SET_ID => {
                        if let Err(e) = self.ingest_template_set(entry) {
                            self.read_errored = true;
                            return Some(Err(e));
                        }
                        self.read_set += 1;
                        continue;
                    }
                    id if id < MIN_DATA_SET_ID => {
                        self.read_set += 1;
                        continue;
                    }
                    _ => {
                        let Some(template) =
                            self.templates.get(&(self.odid, entry.set_id)).cloned()
                        else {
                            // Collector option: no template, no records.
                            self.read_set += 1;
                            continue;
                        };
                        let plan = match projection {
                            None => template.full_plan(),
                            Some(list) => {
                                let plan = template.packplan_for_ielist(list);
                                if !plan.covers_projection() {
                                    self.read_set += 1;
                                    continue;
                                }
                                plan
                            }
                        };
                        self.read_plan = Some((template, plan));
                        self.read_off = entry.off;
                    }
                }
            }
            let Some((template, plan)) = self.read_plan.clone() else {
                self.read_set += 1;
                self.read_off = 0;
                continue;
            };
            let end = entry.off + entry.len;
            if template.min_record_len() == 0
                || end - self.read_off < template.min_record_len()
            {
                // Remaining octets are set padding.
                self.read_set += 1;
                self.read_off = 0;
                self.read_plan = None;
                continue;
            }
            let decoded = {
                let input = &self.buffer[self.read_off..end];
                match template.decode_record_from(input, &plan) {
                    Ok((rest, values)) => Ok((input.len() - rest.len(), values)),
                    Err(_) => Err(IpfixError::Malformed {
                        offset: self.read_off,
                        context: format!("data record in set {}", entry.set_id),
                    }),
                }
            };
            match decoded {
                Ok((consumed, values)) => {
                    self.read_off += consumed;
                    return Some(Ok((template, values)));
                }
                Err(e) => {
                    self.read_errored = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Iterates the loaded message's data records as name-to-value mappings.
    pub fn namedict_iterator(&mut self) -> NamedictIterator<'_> {
        NamedictIterator { buffer: self }
    }

    /// Iterates the loaded message's data records keyed by element handle.
    pub fn iedict_iterator(&mut self) -> IedictIterator<'_> {
        IedictIterator { buffer: self }
    }

    /// Iterates records projected onto `ielist`, in `ielist` order, skipping
    /// sets whose template does not carry every projected element.
    pub fn tuple_iterator(&mut self, ielist: IeList) -> TupleIterator<'_> {
        TupleIterator {
            buffer: self,
            ielist,
        }
    }
}

fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Single-pass iterator over records as name-to-value mappings.
pub struct NamedictIterator<'a> {
    buffer: &'a mut MessageBuffer,
}

impl Iterator for NamedictIterator<'_> {
    type Item = Result<BTreeMap<String, FieldValue>, IpfixError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.next_decoded(None).map(|item| {
            item.map(|(template, values)| {
                template
                    .ies()
                    .iter()
                    .map(|ie| ie.name.clone())
                    .zip(values)
                    .collect()
            })
        })
    }
}

/// Single-pass iterator over records keyed by Information Element handle.
pub struct IedictIterator<'a> {
    buffer: &'a mut MessageBuffer,
}

impl Iterator for IedictIterator<'_> {
    type Item = Result<BTreeMap<Arc<InformationElement>, FieldValue>, IpfixError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.next_decoded(None).map(|item| {
            item.map(|(template, values)| {
                template.ies().iter().map(Arc::clone).zip(values).collect()
            })
        })
    }
}

/// Single-pass iterator over records projected onto a caller-supplied
/// element list.
pub struct TupleIterator<'a> {
    buffer: &'a mut MessageBuffer,
    ielist: IeList,
}

impl Iterator for TupleIterator<'_> {
    type Item = Result<Vec<FieldValue>, IpfixError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer
            .next_decoded(Some(&self.ielist))
            .map(|item| item.map(|(_, values)| values))
    }
}
