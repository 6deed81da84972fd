//! S2 / SmartStart provisioning entries.
//!
//! Entries are created from a scanned QR code or a typed DSK, persisted
//! as the `dskCollection` object and mirrored into the controller's
//! `smartStart.dskProvisioningList` so the engine can include provisioned
//! nodes on its own.
//!
//! QR layout (all decimal digits):
//!
//! ```text
//! 90 VV CCCCC RRR DDDDD x8 [TT LL value]...
//! ```
//!
//! lead-in, version (`01` = SmartStart), checksum, requested keys, the DSK
//! and type-length-value records.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zgate_core::unix_now;
use zgate_storage::{load_json, save_json, ObjectStore};

use crate::error::{Result, ZWaveError};
use crate::tree::{DataPath, DataTree};
use crate::types::NodeId;

/// Object name of the persisted collection.
pub const COLLECTION_OBJECT: &str = "dskCollection";

const HEADER_LEN: usize = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DskState {
    Pending,
    Included,
}

impl DskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Included => "included",
        }
    }
}

impl std::fmt::Display for DskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ProductType TLV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductTypeTlv {
    pub generic_device_class: u8,
    pub specific_device_class: u8,
    pub installer_icon_type: u16,
}

/// ProductId TLV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductIdTlv {
    pub manufacturer_id: u16,
    pub product_type: u16,
    pub product_id: u16,
    pub application_major: u8,
    pub application_minor: u8,
}

/// A TLV record of an unknown type, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTlv {
    #[serde(rename = "type")]
    pub tlv_type: String,
    pub value: String,
}

/// Decoded QR code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCode {
    pub version: u8,
    pub checksum: u16,
    pub requested_keys: u8,
    pub dsk: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductTypeTlv>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductIdTlv>,
    /// `p_id`-like product string, five digit blocks joined by `.`
    #[serde(default)]
    pub p_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_interval: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_tlvs: Vec<RawTlv>,
}

fn digits(s: &str, what: &str) -> Result<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ZWaveError::InvalidQr(format!("{} '{}' is not numeric", what, s)));
    }
    s.parse()
        .map_err(|_| ZWaveError::InvalidQr(format!("{} '{}' out of range", what, s)))
}

fn u16_block(s: &str, what: &str) -> Result<u16> {
    u16::try_from(digits(s, what)?)
        .map_err(|_| ZWaveError::InvalidQr(format!("{} '{}' exceeds 65535", what, s)))
}

fn blocks(s: &str) -> Vec<&str> {
    (0..s.len()).step_by(5).map(|i| &s[i..(i + 5).min(s.len())]).collect()
}

/// Format 40 DSK digits as eight dash-joined blocks.
fn format_dsk(raw: &str) -> String {
    blocks(raw).join("-")
}

/// Whether `s` is a DSK in `xxxxx-xxxxx-...` form with eight blocks.
pub fn is_dsk(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    parts.len() == 8
        && parts
            .iter()
            .all(|p| p.len() == 5 && p.bytes().all(|b| b.is_ascii_digit()) && p.parse::<u32>().is_ok_and(|v| v <= 65535))
}

fn decode_uuid(format: u32, data: &str) -> Result<String> {
    let mut hex = String::new();
    for block in blocks(data) {
        hex.push_str(&format!("{:04X}", u16_block(block, "UUID block")?));
    }
    Ok(match format {
        1 | 3 | 5 => {
            let text: String = (0..hex.len())
                .step_by(2)
                .filter_map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
                .map(char::from)
                .collect();
            let prefix = match format {
                3 => "sn: ",
                5 => "UUID: ",
                _ => "",
            };
            format!("{}{}", prefix, text)
        }
        2 => format!("sn: {}", hex),
        4 => format!("UUID: {}", hex),
        6 if hex.len() == 32 => format!(
            "{}-{}-{}-{}-{}",
            &hex[..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..]
        ),
        _ => hex,
    })
}

impl QrCode {
    /// Parse the numeric QR string.
    pub fn parse(qr: &str) -> Result<Self> {
        let qr = qr.trim();
        if qr.len() < HEADER_LEN || !qr.is_ascii() {
            return Err(ZWaveError::InvalidQr(format!(
                "expected at least {} digits, got {}",
                HEADER_LEN,
                qr.len()
            )));
        }
        if &qr[..2] != "90" {
            return Err(ZWaveError::InvalidQr(format!("unknown lead-in '{}'", &qr[..2])));
        }
        let dsk_digits = &qr[12..52];
        digits(dsk_digits, "DSK")?;
        let dsk = format_dsk(dsk_digits);
        if !is_dsk(&dsk) {
            return Err(ZWaveError::InvalidQr(format!("invalid DSK '{}'", dsk)));
        }

        let mut code = QrCode {
            version: digits(&qr[2..4], "version")? as u8,
            checksum: u16_block(&qr[4..9], "checksum")?,
            requested_keys: u8::try_from(digits(&qr[9..12], "requested keys")?)
                .map_err(|_| ZWaveError::InvalidQr("requested keys exceed 255".to_string()))?,
            dsk,
            ..Default::default()
        };

        let mut rest = &qr[HEADER_LEN..];
        while !rest.is_empty() {
            if rest.len() < 4 {
                return Err(ZWaveError::InvalidQr(format!("truncated TLV header '{}'", rest)));
            }
            let tlv_type = &rest[..2];
            let len = digits(&rest[2..4], "TLV length")? as usize;
            if rest.len() < 4 + len {
                return Err(ZWaveError::InvalidQr(format!(
                    "TLV {} needs {} digits, {} left",
                    tlv_type,
                    len,
                    rest.len() - 4
                )));
            }
            let value = &rest[4..4 + len];
            code.apply_tlv(tlv_type, value)?;
            rest = &rest[4 + len..];
        }
        Ok(code)
    }

    fn apply_tlv(&mut self, tlv_type: &str, value: &str) -> Result<()> {
        match (tlv_type, value.len()) {
            ("00", 10) => {
                let device = u16_block(&value[..5], "device type")?;
                self.product_type = Some(ProductTypeTlv {
                    generic_device_class: (device >> 8) as u8,
                    specific_device_class: (device & 0xff) as u8,
                    installer_icon_type: u16_block(&value[5..], "installer icon")?,
                });
            }
            ("02", 20) => {
                let version = u16_block(&value[15..], "application version")?;
                self.product = Some(ProductIdTlv {
                    manufacturer_id: u16_block(&value[..5], "manufacturer id")?,
                    product_type: u16_block(&value[5..10], "product type")?,
                    product_id: u16_block(&value[10..15], "product id")?,
                    application_major: (version >> 8) as u8,
                    application_minor: (version & 0xff) as u8,
                });
                self.p_id = blocks(value).join(".");
            }
            ("04", 2) => {
                self.request_interval = Some(digits(value, "request interval")? as u8);
            }
            ("06", 42) => {
                let format = digits(&value[..2], "UUID format")?;
                self.uuid = Some(decode_uuid(format, &value[2..])?);
            }
            _ => self.unknown_tlvs.push(RawTlv {
                tlv_type: tlv_type.to_string(),
                value: value.to_string(),
            }),
        }
        Ok(())
    }
}

/// Derive the DSK from an S2 public key: the first 16 bytes as eight
/// big-endian u16 values, zero padded to five digits.
pub fn public_key_to_dsk(public_key: &[u8]) -> Option<String> {
    if public_key.len() < 16 {
        return None;
    }
    Some(
        public_key[..16]
            .chunks(2)
            .map(|pair| format!("{:05}", u16::from_be_bytes([pair[0], pair[1]])))
            .collect::<Vec<_>>()
            .join("-"),
    )
}

/// One provisioning entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DskEntry {
    pub id: u32,
    pub is_smart_start: bool,
    pub state: DskState,
    pub node_id: Option<NodeId>,
    /// Unix seconds of creation
    pub timestamp: i64,
    #[serde(rename = "ZW_QR")]
    pub zw_qr: String,
    #[serde(rename = "PId", default)]
    pub p_id: String,
    pub given_name: Option<String>,
    #[serde(default)]
    pub location: i64,
    /// Unix seconds of inclusion
    pub added_at: Option<i64>,
    #[serde(rename = "DSK")]
    pub dsk: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<QrCode>,
}

impl DskEntry {
    /// Build a pending entry from a QR code or a plain DSK.
    pub fn from_input(input: &str) -> Result<Self> {
        let input = input.trim();
        let (dsk, qr) = if input.starts_with("90") && !input.contains('-') {
            let qr = QrCode::parse(input)?;
            (qr.dsk.clone(), Some(qr))
        } else if is_dsk(input) {
            (input.to_string(), None)
        } else {
            return Err(ZWaveError::InvalidQr(format!(
                "'{}' is neither a QR code nor a DSK",
                input
            )));
        };

        Ok(Self {
            id: 0,
            is_smart_start: qr.as_ref().is_some_and(|q| q.version == 1),
            state: DskState::Pending,
            node_id: None,
            timestamp: unix_now(),
            zw_qr: input.to_string(),
            p_id: qr.as_ref().map(|q| q.p_id.clone()).unwrap_or_default(),
            given_name: None,
            location: 0,
            added_at: None,
            dsk,
            qr,
        })
    }
}

/// The persisted provisioning list.
pub struct DskCollection {
    entries: RwLock<Vec<DskEntry>>,
    store: Arc<dyn ObjectStore>,
    tree: Option<Arc<DataTree>>,
}

impl DskCollection {
    /// Load the collection. With a `tree`, every change is mirrored into
    /// the controller's provisioning list.
    pub fn open(store: Arc<dyn ObjectStore>, tree: Option<Arc<DataTree>>) -> Result<Self> {
        let entries: Vec<DskEntry> = load_json(store.as_ref(), COLLECTION_OBJECT)?.unwrap_or_default();
        tracing::debug!("Loaded {} DSK entries", entries.len());
        let this = Self {
            entries: RwLock::new(entries),
            store,
            tree,
        };
        this.sync_provisioning_list();
        Ok(this)
    }

    fn persist(&self, entries: &[DskEntry]) -> Result<()> {
        save_json(self.store.as_ref(), COLLECTION_OBJECT, &entries)?;
        Ok(())
    }

    fn sync_provisioning_list(&self) {
        if let Some(tree) = &self.tree {
            let dsks: Vec<String> = self.entries.read().iter().map(|e| e.dsk.clone()).collect();
            tree.set(&DataPath::controller("smartStart.dskProvisioningList"), dsks);
        }
    }

    /// Add an entry from a QR code or DSK.
    pub fn add(&self, input: &str) -> Result<DskEntry> {
        let mut entry = DskEntry::from_input(input)?;
        {
            let mut entries = self.entries.write();
            if entries.iter().any(|e| e.dsk == entry.dsk) {
                return Err(ZWaveError::Conflict(format!("DSK {} already provisioned", entry.dsk)));
            }
            entry.id = (1..)
                .find(|id| entries.iter().all(|e| e.id != *id))
                .unwrap_or_default();
            entries.push(entry.clone());
            self.persist(&entries)?;
        }
        self.sync_provisioning_list();
        tracing::info!("Added DSK entry {} ({})", entry.id, entry.dsk);
        Ok(entry)
    }

    /// Replace the entry with the same id.
    pub fn update(&self, entry: DskEntry) -> Result<DskEntry> {
        {
            let mut entries = self.entries.write();
            if entries.iter().any(|e| e.id != entry.id && e.dsk == entry.dsk) {
                return Err(ZWaveError::Conflict(format!("DSK {} already provisioned", entry.dsk)));
            }
            let slot = entries
                .iter_mut()
                .find(|e| e.id == entry.id)
                .ok_or_else(|| ZWaveError::NotFound(format!("DSK entry {}", entry.id)))?;
            *slot = entry.clone();
            self.persist(&entries)?;
        }
        self.sync_provisioning_list();
        Ok(entry)
    }

    pub fn remove(&self, id: u32) -> Result<DskEntry> {
        let removed = {
            let mut entries = self.entries.write();
            let index = entries
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| ZWaveError::NotFound(format!("DSK entry {}", id)))?;
            let removed = entries.remove(index);
            self.persist(&entries)?;
            removed
        };
        self.sync_provisioning_list();
        tracing::info!("Removed DSK entry {} ({})", id, removed.dsk);
        Ok(removed)
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<()> {
        {
            let mut entries = self.entries.write();
            entries.clear();
            self.persist(&entries)?;
        }
        self.sync_provisioning_list();
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<DskEntry> {
        self.entries.read().iter().find(|e| e.id == id).cloned()
    }

    pub fn find_by_dsk(&self, dsk: &str) -> Option<DskEntry> {
        self.entries.read().iter().find(|e| e.dsk == dsk).cloned()
    }

    pub fn list(&self) -> Vec<DskEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// A node with this DSK finished inclusion. Pending entries become
    /// `included`; the matching entry (if any) is returned either way.
    pub fn mark_included(&self, dsk: &str, node: NodeId) -> Result<Option<DskEntry>> {
        let mut entries = self.entries.write();
        let Some(entry) = entries.iter_mut().find(|e| e.dsk == dsk) else {
            return Ok(None);
        };
        if entry.state == DskState::Included {
            return Ok(Some(entry.clone()));
        }
        entry.state = DskState::Included;
        entry.node_id = Some(node);
        entry.added_at = Some(unix_now());
        let updated = entry.clone();
        self.persist(&entries)?;
        tracing::info!("DSK entry {} included as node {}", updated.id, node);
        Ok(Some(updated))
    }

    /// A node was excluded: its entry goes back to `pending`.
    pub fn reset_pending_for_node(&self, node: NodeId) -> Result<bool> {
        let mut entries = self.entries.write();
        let Some(entry) = entries.iter_mut().find(|e| e.node_id == Some(node)) else {
            return Ok(false);
        };
        entry.state = DskState::Pending;
        entry.node_id = None;
        entry.added_at = None;
        self.persist(&entries)?;
        Ok(true)
    }
}
