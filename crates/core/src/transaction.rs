//! Value-transfer transactions and their signing message.

use crate::crypto::{CryptoError, Identity, Keypair, PublicKey, Signature};
use crate::hash::write_json_string;
use serde::{Deserialize, Serialize};

/// Encodings of the message a transaction signature covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageEncoding {
    /// `{"sender": S, "receiver": R, "amount": A}` in that field order,
    /// `", "` and `": "` separators, ASCII-only string escapes.
    #[default]
    V1,
}

impl MessageEncoding {
    /// Encode the signed fields of `tx`.
    pub fn encode(self, tx: &Transaction) -> Vec<u8> {
        match self {
            MessageEncoding::V1 => {
                let mut out = String::from("{\"sender\": ");
                write_json_string(&mut out, tx.sender.as_str());
                out.push_str(", \"receiver\": ");
                write_json_string(&mut out, tx.receiver.as_str());
                out.push_str(", \"amount\": ");
                out.push_str(&tx.amount.to_string());
                out.push('}');
                out.into_bytes()
            }
        }
    }
}

/// A transfer of `amount` units from `sender` to `receiver`.
///
/// Committed and pending transactions never carry their signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    /// Sending identity, or `"root"` for issuance.
    pub sender: Identity,
    /// Receiving identity.
    pub receiver: Identity,
    /// Units transferred.
    pub amount: u64,
}

impl Transaction {
    /// Create a new transaction.
    pub fn new(sender: impl Into<Identity>, receiver: impl Into<Identity>, amount: u64) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
        }
    }

    /// Create an issuance from the minting identity.
    pub fn issuance(receiver: impl Into<Identity>, amount: u64) -> Self {
        Self::new(Identity::root(), receiver, amount)
    }

    /// Whether the sender is the minting identity.
    pub fn is_issuance(&self) -> bool {
        self.sender.is_root()
    }

    /// Whether `identity` sends or receives in this transaction.
    pub fn involves(&self, identity: &Identity) -> bool {
        self.sender == *identity || self.receiver == *identity
    }

    /// The bytes a signature over this transaction covers.
    pub fn signing_message(&self) -> Vec<u8> {
        MessageEncoding::V1.encode(self)
    }

    /// Sign the transaction with the given keypair.
    pub fn sign(&self, keypair: &Keypair) -> Signature {
        keypair.sign(&self.signing_message())
    }

    /// Create a signed transaction.
    pub fn signed(self, keypair: &Keypair) -> SignedTransaction {
        let signature = self.sign(keypair);
        SignedTransaction {
            transaction: self,
            signature: Some(signature),
        }
    }

    /// Verify a signature over this transaction.
    pub fn verify(&self, public_key: &PublicKey, signature: &Signature) -> Result<(), CryptoError> {
        public_key.verify(&self.signing_message(), signature)
    }
}

/// A transaction as submitted for admission, with its optional signature.
///
/// Flattened on the wire: `{sender, receiver, amount, signature}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl SignedTransaction {
    /// Wrap a transaction without a signature (issuance).
    pub fn unsigned(transaction: Transaction) -> Self {
        Self {
            transaction,
            signature: None,
        }
    }

    /// Drop the signature, keeping the committed form.
    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }
}
