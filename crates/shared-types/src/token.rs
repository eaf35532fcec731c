//! # Token Metadata
//!
//! Records binding token identifiers and quantities to transaction outputs,
//! and the codec for the OP_RETURN token messages they are derived from.
//!
//! Message layout (all fields are data pushes after `OP_RETURN`):
//!
//! ```text
//! "SLP\0" <token_type> "GENESIS" <ticker> <name> <doc_uri> <doc_hash> <decimals> <baton_vout> <qty>
//! "SLP\0" <token_type> "MINT"    <token_id> <baton_vout> <qty>
//! "SLP\0" <token_type> "SEND"    <token_id> <amount_1> ... <amount_n>
//! ```
//!
//! Token ids inside messages are in display byte order; [`TokenId`] keeps the
//! internal order and [`TokenId::lookup_key`] yields the key descriptive
//! records are stored under.

use crate::entities::{Hash, OutPoint, Transaction, OP_RETURN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const LOKAD_ID: &[u8] = b"SLP\0";
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const MAX_SEND_OUTPUTS: usize = 19;

/// The only token type whose records carry an identifier.
pub const SUPPORTED_TOKEN_TYPE: u8 = 1;

/// Token identifier in internal byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub Hash);

impl TokenId {
    /// From the display-order bytes carried by MINT and SEND messages.
    pub fn from_display(bytes: Hash) -> Self {
        let mut internal = bytes;
        internal.reverse();
        Self(internal)
    }

    pub fn to_display(&self) -> Hash {
        let mut display = self.0;
        display.reverse();
        display
    }

    /// Key the descriptive [`TokenRecord`] is stored under.
    pub fn lookup_key(&self) -> Hash {
        self.to_display()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenOutputKind {
    Amount,
    MintBaton,
}

/// Token data attached to one transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTokenRecord {
    pub outpoint: OutPoint,
    /// `None` for token types this node does not interpret.
    pub token_id: Option<TokenId>,
    pub token_type: u8,
    pub kind: TokenOutputKind,
    pub amount: u64,
}

/// Descriptive record created by a GENESIS message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_id: TokenId,
    pub token_type: u8,
    pub ticker: String,
    pub name: String,
    pub document_uri: String,
    pub document_hash: Option<Hash>,
    pub decimals: u8,
}

/// Token overlay attached to a transaction by the query layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTokenOverlay {
    pub token: Option<TokenRecord>,
    pub outputs: Vec<CoinTokenRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenScriptError {
    #[error("not a token message")]
    NotTokenMessage,
    #[error("truncated push at offset {0}")]
    TruncatedPush(usize),
    #[error("unknown transaction type: {0}")]
    UnknownKind(String),
    #[error("malformed field: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenMessage {
    Genesis {
        token_type: u8,
        ticker: String,
        name: String,
        document_uri: String,
        document_hash: Option<Hash>,
        decimals: u8,
        mint_baton_vout: Option<u8>,
        quantity: u64,
    },
    Mint {
        token_type: u8,
        token_id: TokenId,
        mint_baton_vout: Option<u8>,
        quantity: u64,
    },
    Send {
        token_type: u8,
        token_id: TokenId,
        amounts: Vec<u64>,
    },
}

impl TokenMessage {
    pub fn token_type(&self) -> u8 {
        match self {
            TokenMessage::Genesis { token_type, .. }
            | TokenMessage::Mint { token_type, .. }
            | TokenMessage::Send { token_type, .. } => *token_type,
        }
    }

    /// Parses the token message carried by an OP_RETURN script.
    pub fn parse(script: &[u8]) -> Result<Self, TokenScriptError> {
        if script.first() != Some(&OP_RETURN) {
            return Err(TokenScriptError::NotTokenMessage);
        }
        let pushes = read_pushes(&script[1..])?;
        let mut fields = pushes.into_iter();

        if fields.next().as_deref() != Some(LOKAD_ID) {
            return Err(TokenScriptError::NotTokenMessage);
        }
        let token_type = match fields.next().as_deref() {
            Some([t]) => *t,
            _ => return Err(TokenScriptError::Malformed("token_type")),
        };
        let kind = fields.next().ok_or(TokenScriptError::Malformed("transaction_type"))?;

        match kind.as_slice() {
            b"GENESIS" => {
                let ticker = utf8_field(fields.next(), "ticker")?;
                let name = utf8_field(fields.next(), "name")?;
                let document_uri = utf8_field(fields.next(), "document_uri")?;
                let document_hash = match fields.next() {
                    Some(h) if h.is_empty() => None,
                    Some(h) if h.len() == 32 => {
                        let mut out = [0u8; 32];
                        out.copy_from_slice(&h);
                        Some(out)
                    }
                    _ => return Err(TokenScriptError::Malformed("document_hash")),
                };
                let decimals = match fields.next().as_deref() {
                    Some([d]) if *d <= 9 => *d,
                    _ => return Err(TokenScriptError::Malformed("decimals")),
                };
                let mint_baton_vout = baton_field(fields.next())?;
                let quantity = amount_field(fields.next(), "initial_quantity")?;
                Ok(TokenMessage::Genesis {
                    token_type,
                    ticker,
                    name,
                    document_uri,
                    document_hash,
                    decimals,
                    mint_baton_vout,
                    quantity,
                })
            }
            b"MINT" => {
                let token_id = token_id_field(fields.next())?;
                let mint_baton_vout = baton_field(fields.next())?;
                let quantity = amount_field(fields.next(), "additional_quantity")?;
                Ok(TokenMessage::Mint {
                    token_type,
                    token_id,
                    mint_baton_vout,
                    quantity,
                })
            }
            b"SEND" => {
                let token_id = token_id_field(fields.next())?;
                let amounts = fields
                    .map(|f| amount_field(Some(f), "token_output_quantity"))
                    .collect::<Result<Vec<_>, _>>()?;
                if amounts.is_empty() || amounts.len() > MAX_SEND_OUTPUTS {
                    return Err(TokenScriptError::Malformed("token_output_quantity"));
                }
                Ok(TokenMessage::Send {
                    token_type,
                    token_id,
                    amounts,
                })
            }
            other => Err(TokenScriptError::UnknownKind(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    /// Encodes the message as an OP_RETURN locking script.
    pub fn to_script(&self) -> Vec<u8> {
        let mut script = vec![OP_RETURN];
        push_data(&mut script, LOKAD_ID);
        push_data(&mut script, &[self.token_type()]);
        match self {
            TokenMessage::Genesis {
                ticker,
                name,
                document_uri,
                document_hash,
                decimals,
                mint_baton_vout,
                quantity,
                ..
            } => {
                push_data(&mut script, b"GENESIS");
                push_data(&mut script, ticker.as_bytes());
                push_data(&mut script, name.as_bytes());
                push_data(&mut script, document_uri.as_bytes());
                push_data(&mut script, document_hash.as_ref().map_or(&[][..], |h| &h[..]));
                push_data(&mut script, &[*decimals]);
                push_baton(&mut script, *mint_baton_vout);
                push_data(&mut script, &quantity.to_be_bytes());
            }
            TokenMessage::Mint {
                token_id,
                mint_baton_vout,
                quantity,
                ..
            } => {
                push_data(&mut script, b"MINT");
                push_data(&mut script, &token_id.to_display());
                push_baton(&mut script, *mint_baton_vout);
                push_data(&mut script, &quantity.to_be_bytes());
            }
            TokenMessage::Send {
                token_id, amounts, ..
            } => {
                push_data(&mut script, b"SEND");
                push_data(&mut script, &token_id.to_display());
                for amount in amounts {
                    push_data(&mut script, &amount.to_be_bytes());
                }
            }
        }
        script
    }
}

/// Token data derived from a transaction's first output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxTokenData {
    pub records: Vec<CoinTokenRecord>,
    /// Present for supported GENESIS transactions.
    pub token: Option<TokenRecord>,
}

impl TxTokenData {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.token.is_none()
    }
}

/// Extracts the token records of `tx`. Transactions without a well-formed
/// message carry no token data.
pub fn token_data_for_tx(tx: &Transaction, hash: Hash) -> TxTokenData {
    let Some(first) = tx.outputs.first() else {
        return TxTokenData::default();
    };
    let Ok(message) = TokenMessage::parse(&first.script) else {
        return TxTokenData::default();
    };

    let token_type = message.token_type();
    let supported = token_type == SUPPORTED_TOKEN_TYPE;
    let mut records = Vec::new();
    let mut token = None;

    let mut record = |index: usize, id: TokenId, kind: TokenOutputKind, amount: u64| {
        if index == 0 || index >= tx.outputs.len() {
            return;
        }
        records.push(CoinTokenRecord {
            outpoint: OutPoint::new(hash, index as u32),
            token_id: supported.then_some(id),
            token_type,
            kind,
            amount,
        });
    };

    match message {
        TokenMessage::Genesis {
            ticker,
            name,
            document_uri,
            document_hash,
            decimals,
            mint_baton_vout,
            quantity,
            ..
        } => {
            let id = TokenId(hash);
            record(1, id, TokenOutputKind::Amount, quantity);
            if let Some(vout) = mint_baton_vout {
                record(vout as usize, id, TokenOutputKind::MintBaton, 0);
            }
            if supported {
                token = Some(TokenRecord {
                    token_id: id,
                    token_type,
                    ticker,
                    name,
                    document_uri,
                    document_hash,
                    decimals,
                });
            }
        }
        TokenMessage::Mint {
            token_id,
            mint_baton_vout,
            quantity,
            ..
        } => {
            record(1, token_id, TokenOutputKind::Amount, quantity);
            if let Some(vout) = mint_baton_vout {
                record(vout as usize, token_id, TokenOutputKind::MintBaton, 0);
            }
        }
        TokenMessage::Send {
            token_id, amounts, ..
        } => {
            for (i, amount) in amounts.into_iter().enumerate() {
                record(i + 1, token_id, TokenOutputKind::Amount, amount);
            }
        }
    }

    TxTokenData { records, token }
}

fn read_pushes(mut data: &[u8]) -> Result<Vec<Vec<u8>>, TokenScriptError> {
    let mut pushes = Vec::new();
    let total = data.len();
    while let Some((&op, rest)) = data.split_first() {
        let offset = total - data.len();
        let (len, rest) = match op {
            0x01..=0x4b => (op as usize, rest),
            OP_PUSHDATA1 => match rest.split_first() {
                Some((&n, rest)) => (n as usize, rest),
                None => return Err(TokenScriptError::TruncatedPush(offset)),
            },
            OP_PUSHDATA2 => {
                if rest.len() < 2 {
                    return Err(TokenScriptError::TruncatedPush(offset));
                }
                (u16::from_le_bytes([rest[0], rest[1]]) as usize, &rest[2..])
            }
            _ => return Err(TokenScriptError::NotTokenMessage),
        };
        if rest.len() < len {
            return Err(TokenScriptError::TruncatedPush(offset));
        }
        pushes.push(rest[..len].to_vec());
        data = &rest[len..];
    }
    Ok(pushes)
}

fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => script.extend_from_slice(&[OP_PUSHDATA1, 0]),
        n @ 1..=0x4b => script.push(n as u8),
        n @ 0x4c..=0xff => script.extend_from_slice(&[OP_PUSHDATA1, n as u8]),
        n => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(n as u16).to_le_bytes());
        }
    }
    script.extend_from_slice(data);
}

fn push_baton(script: &mut Vec<u8>, vout: Option<u8>) {
    match vout {
        Some(v) => push_data(script, &[v]),
        None => push_data(script, &[]),
    }
}

fn utf8_field(field: Option<Vec<u8>>, name: &'static str) -> Result<String, TokenScriptError> {
    let bytes = field.ok_or(TokenScriptError::Malformed(name))?;
    String::from_utf8(bytes).map_err(|_| TokenScriptError::Malformed(name))
}

fn amount_field(field: Option<Vec<u8>>, name: &'static str) -> Result<u64, TokenScriptError> {
    let bytes = field.ok_or(TokenScriptError::Malformed(name))?;
    let raw: [u8; 8] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| TokenScriptError::Malformed(name))?;
    Ok(u64::from_be_bytes(raw))
}

fn token_id_field(field: Option<Vec<u8>>) -> Result<TokenId, TokenScriptError> {
    let bytes = field.ok_or(TokenScriptError::Malformed("token_id"))?;
    let raw: Hash = bytes
        .as_slice()
        .try_into()
        .map_err(|_| TokenScriptError::Malformed("token_id"))?;
    Ok(TokenId::from_display(raw))
}

fn baton_field(field: Option<Vec<u8>>) -> Result<Option<u8>, TokenScriptError> {
    match field.as_deref() {
        Some([]) => Ok(None),
        Some([v]) if *v >= 2 => Ok(Some(*v)),
        _ => Err(TokenScriptError::Malformed("mint_baton_vout")),
    }
}
