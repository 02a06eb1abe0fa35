use crate::core::amount::Amount;
use crate::core::utxo::UtxoLookup;
use crate::crypto::hash::{Hash160, Hash256};
use crate::crypto::keys::KeyPair;
use crate::crypto::signatures::SignatureVerifier;
use crate::{InvalidReason, LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// `output_index` carried by the single input of a coinbase transaction.
pub const COINBASE_OUTPUT_INDEX: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<String>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prev_tx_id: String,
    pub output_index: i32,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub signer_public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Amount,
    #[serde(with = "hex_bytes")]
    pub owner_hash: Vec<u8>,
}

/// Key of one transaction output in the UTXO index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: String,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: impl Into<String>, index: u32) -> Self {
        Self {
            txid: txid.into(),
            index,
        }
    }
}

impl TxInput {
    /// Unsigned input spending `prev_tx_id:output_index`. Indices above
    /// `i32::MAX` cannot be represented in an input.
    pub fn spending(prev_tx_id: impl Into<String>, output_index: u32) -> Result<Self> {
        let output_index = i32::try_from(output_index)
            .map_err(|_| LedgerError::InvalidInput(format!("Output index {} is out of range", output_index)))?;

        Ok(Self {
            prev_tx_id: prev_tx_id.into(),
            output_index,
            signature: Vec::new(),
            signer_public_key: Vec::new(),
        })
    }

    /// `None` for the coinbase sentinel or any negative index.
    pub fn outpoint(&self) -> Option<OutPoint> {
        u32::try_from(self.output_index)
            .ok()
            .map(|index| OutPoint::new(self.prev_tx_id.clone(), index))
    }
}

impl TxOutput {
    pub fn new(value: Amount, owner_hash: &Hash160) -> Self {
        Self {
            value,
            owner_hash: owner_hash.to_vec(),
        }
    }
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            id: None,
            inputs,
            outputs,
        }
    }

    /// Reward transaction. `tag` lands in the sentinel input so coinbases
    /// paying the same owner the same value at different heights get
    /// distinct ids.
    pub fn new_coinbase(owner_hash: Vec<u8>, value: Amount, tag: &str) -> Self {
        let coinbase_input = TxInput {
            prev_tx_id: String::new(),
            output_index: COINBASE_OUTPUT_INDEX,
            signature: Vec::new(),
            signer_public_key: tag.as_bytes().to_vec(),
        };

        let mut tx = Self::new(vec![coinbase_input], vec![TxOutput { value, owner_hash }]);
        tx.id = Some(tx.compute_id());
        tx
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx_id.is_empty()
            && self.inputs[0].output_index == COINBASE_OUTPUT_INDEX
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn compute_id(&self) -> String {
        self.compute_hash().to_hex()
    }

    /// Content hash over inputs then outputs. Positional: reordering either
    /// list changes it.
    pub fn compute_hash(&self) -> Hash256 {
        let mut data = Vec::new();

        data.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            put_bytes(&mut data, input.prev_tx_id.as_bytes());
            data.extend_from_slice(&input.output_index.to_le_bytes());
            put_bytes(&mut data, &input.signature);
            put_bytes(&mut data, &input.signer_public_key);
        }

        data.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            data.extend_from_slice(&output.value.base_units().to_le_bytes());
            put_bytes(&mut data, &output.owner_hash);
        }

        Hash256::hash(&data)
    }

    /// Assigns the id. Ids are write-once.
    pub fn set_id(&mut self) -> Result<String> {
        if let Some(id) = &self.id {
            return Err(LedgerError::InvalidInput(format!("Transaction id already assigned: {}", id)));
        }
        let id = self.compute_id();
        self.id = Some(id.clone());
        Ok(id)
    }

    /// Message signed for `input_index`: every outpoint and every output,
    /// without signatures or keys.
    pub fn signature_hash(&self, input_index: usize) -> Hash256 {
        let mut data = Vec::new();
        data.extend_from_slice(&(input_index as u32).to_le_bytes());

        data.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            put_bytes(&mut data, input.prev_tx_id.as_bytes());
            data.extend_from_slice(&input.output_index.to_le_bytes());
        }

        data.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            data.extend_from_slice(&output.value.base_units().to_le_bytes());
            put_bytes(&mut data, &output.owner_hash);
        }

        Hash256::double_hash(&data)
    }

    pub fn sign_input(&mut self, input_index: usize, keypair: &KeyPair) -> Result<()> {
        if self.id.is_some() {
            return Err(LedgerError::InvalidInput("Cannot sign a transaction after its id is assigned".to_string()));
        }
        if input_index >= self.inputs.len() {
            return Err(LedgerError::InvalidInput(format!("Invalid input index {}", input_index)));
        }

        let signature = keypair.private_key.sign(&self.signature_hash(input_index))?;
        let input = &mut self.inputs[input_index];
        input.signature = signature.to_bytes();
        input.signer_public_key = keypair.public_key.to_bytes().to_vec();
        Ok(())
    }

    pub fn sign_all(&mut self, keypair: &KeyPair) -> Result<()> {
        for index in 0..self.inputs.len() {
            self.sign_input(index, keypair)?;
        }
        Ok(())
    }

    pub fn total_output_value(&self) -> Option<Amount> {
        Amount::checked_sum(self.outputs.iter().map(|output| output.value))
    }

    /// Checks identity, structure, input resolution against `utxo`, value
    /// conservation and spending authorization.
    pub fn validate<L: UtxoLookup + ?Sized>(
        &self,
        utxo: &L,
        verifier: &dyn SignatureVerifier,
    ) -> std::result::Result<(), InvalidReason> {
        let claimed = self.id.as_ref().ok_or(InvalidReason::MissingId)?;
        let computed = self.compute_id();
        if *claimed != computed {
            return Err(InvalidReason::IdMismatch {
                claimed: claimed.clone(),
                computed,
            });
        }

        if self.is_coinbase() {
            if self.outputs.len() != 1 {
                return Err(InvalidReason::MalformedCoinbase {
                    outputs: self.outputs.len(),
                });
            }
            return Ok(());
        }

        if self.inputs.is_empty() {
            return Err(InvalidReason::MissingInputs);
        }
        if self.outputs.is_empty() {
            return Err(InvalidReason::MissingOutputs);
        }

        let mut seen = HashSet::new();
        let mut available = Amount::ZERO;

        for (i, input) in self.inputs.iter().enumerate() {
            let unresolved = || InvalidReason::UnresolvedInput {
                input: i,
                txid: input.prev_tx_id.clone(),
                index: input.output_index,
            };

            let outpoint = input.outpoint().ok_or_else(unresolved)?;
            if !seen.insert(outpoint.clone()) || utxo.spent_in_batch(&outpoint) {
                return Err(InvalidReason::DoubleSpend {
                    txid: input.prev_tx_id.clone(),
                    index: input.output_index,
                });
            }

            let record = utxo.lookup(&outpoint).ok_or_else(unresolved)?;

            if verifier.owner_hash(&input.signer_public_key) != record.owner_hash {
                return Err(InvalidReason::OwnerMismatch { input: i });
            }
            if !verifier.verify(&input.signer_public_key, &self.signature_hash(i), &input.signature) {
                return Err(InvalidReason::BadSignature { input: i });
            }

            available = available
                .checked_add(record.value)
                .ok_or(InvalidReason::ValueOverflow)?;
        }

        let required = self.total_output_value().ok_or(InvalidReason::ValueOverflow)?;
        if available < required {
            return Err(InvalidReason::InsufficientFunds { required, available });
        }

        Ok(())
    }
}

fn put_bytes(data: &mut Vec<u8>, bytes: &[u8]) {
    data.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    data.extend_from_slice(bytes);
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utxo::UtxoIndex;
    use crate::crypto::signatures::Secp256k1Verifier;

    fn funded(owner: &KeyPair, value: Amount) -> (UtxoIndex, Transaction) {
        let coinbase = Transaction::new_coinbase(owner.owner_hash().to_vec(), value, "genesis");
        let mut index = UtxoIndex::new();
        index.apply_transaction(&coinbase).unwrap();
        (index, coinbase)
    }

    fn spend(from: &KeyPair, prev: &Transaction, outputs: Vec<TxOutput>) -> Transaction {
        let mut tx = Transaction::new(vec![TxInput::spending(prev.id().unwrap(), 0).unwrap()], outputs);
        tx.sign_all(from).unwrap();
        tx.set_id().unwrap();
        tx
    }

    #[test]
    fn test_coinbase_transaction() {
        let tx = Transaction::new_coinbase(vec![7u8; 20], Amount::from_coins(50), "genesis");

        assert!(tx.is_coinbase());
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, Amount::from_coins(50));
        assert_eq!(tx.id(), Some(tx.compute_id().as_str()));
    }

    #[test]
    fn test_coinbase_tags_give_distinct_ids() {
        let a = Transaction::new_coinbase(vec![1u8; 20], Amount::from_coins(50), "height 1");
        let b = Transaction::new_coinbase(vec![1u8; 20], Amount::from_coins(50), "height 2");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_id_is_order_sensitive() {
        let outputs = vec![
            TxOutput { value: Amount::from_coins(1), owner_hash: vec![1u8; 20] },
            TxOutput { value: Amount::from_coins(2), owner_hash: vec![2u8; 20] },
        ];
        let mut reversed = outputs.clone();
        reversed.reverse();

        let inputs = vec![TxInput::spending("aa", 0).unwrap()];
        let a = Transaction::new(inputs.clone(), outputs);
        let b = Transaction::new(inputs, reversed);

        assert_eq!(a.compute_id(), a.compute_id());
        assert_ne!(a.compute_id(), b.compute_id());
    }

    #[test]
    fn test_spending_rejects_unrepresentable_index() {
        let input = TxInput::spending("aa", i32::MAX as u32).unwrap();
        assert_eq!(input.outpoint(), Some(OutPoint::new("aa", i32::MAX as u32)));

        assert!(matches!(TxInput::spending("aa", u32::MAX), Err(LedgerError::InvalidInput(_))));
        assert!(TxInput::spending("aa", 1 << 31).is_err());
    }

    #[test]
    fn test_set_id_is_write_once() {
        let mut tx = Transaction::new(vec![TxInput::spending("aa", 0).unwrap()], vec![]);
        assert!(tx.id().is_none());
        tx.set_id().unwrap();
        assert!(tx.set_id().is_err());
    }

    #[test]
    fn test_valid_spend() -> Result<()> {
        let alice = KeyPair::new()?;
        let bob = KeyPair::new()?;
        let (index, coinbase) = funded(&alice, Amount::from_coins(50));

        let tx = spend(&alice, &coinbase, vec![
            TxOutput::new(Amount::from_coins(30), &bob.owner_hash()),
            TxOutput::new(Amount::from_coins(20), &alice.owner_hash()),
        ]);

        assert_eq!(tx.validate(&index, &Secp256k1Verifier::new()), Ok(()));
        Ok(())
    }

    #[test]
    fn test_insufficient_funds() -> Result<()> {
        let alice = KeyPair::new()?;
        let (index, coinbase) = funded(&alice, Amount::from_coins(50));

        let tx = spend(&alice, &coinbase, vec![TxOutput::new(Amount::from_coins(51), &alice.owner_hash())]);

        assert_eq!(
            tx.validate(&index, &Secp256k1Verifier::new()),
            Err(InvalidReason::InsufficientFunds {
                required: Amount::from_coins(51),
                available: Amount::from_coins(50),
            })
        );
        Ok(())
    }

    #[test]
    fn test_unresolved_input() -> Result<()> {
        let alice = KeyPair::new()?;
        let (index, _) = funded(&alice, Amount::from_coins(50));

        let mut tx = Transaction::new(
            vec![TxInput::spending("00".repeat(32), 0).unwrap()],
            vec![TxOutput::new(Amount::from_coins(1), &alice.owner_hash())],
        );
        tx.sign_all(&alice)?;
        tx.set_id()?;

        assert!(matches!(
            tx.validate(&index, &Secp256k1Verifier::new()),
            Err(InvalidReason::UnresolvedInput { input: 0, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_spending_someone_elses_output() -> Result<()> {
        let alice = KeyPair::new()?;
        let mallory = KeyPair::new()?;
        let (index, coinbase) = funded(&alice, Amount::from_coins(50));

        let tx = spend(&mallory, &coinbase, vec![TxOutput::new(Amount::from_coins(50), &mallory.owner_hash())]);

        assert_eq!(
            tx.validate(&index, &Secp256k1Verifier::new()),
            Err(InvalidReason::OwnerMismatch { input: 0 })
        );
        Ok(())
    }

    #[test]
    fn test_bad_signature() -> Result<()> {
        let alice = KeyPair::new()?;
        let (index, coinbase) = funded(&alice, Amount::from_coins(50));

        let mut tx = Transaction::new(
            vec![TxInput::spending(coinbase.id().unwrap(), 0).unwrap()],
            vec![TxOutput::new(Amount::from_coins(10), &alice.owner_hash())],
        );
        tx.sign_all(&alice)?;
        // Alter the payload after signing; the signature no longer covers it.
        tx.outputs[0].value = Amount::from_coins(40);
        tx.set_id()?;

        assert_eq!(
            tx.validate(&index, &Secp256k1Verifier::new()),
            Err(InvalidReason::BadSignature { input: 0 })
        );
        Ok(())
    }

    #[test]
    fn test_same_outpoint_twice_in_one_transaction() -> Result<()> {
        let alice = KeyPair::new()?;
        let (index, coinbase) = funded(&alice, Amount::from_coins(50));
        let txid = coinbase.id().unwrap();

        let mut tx = Transaction::new(
            vec![TxInput::spending(txid, 0).unwrap(), TxInput::spending(txid, 0).unwrap()],
            vec![TxOutput::new(Amount::from_coins(100), &alice.owner_hash())],
        );
        tx.sign_all(&alice)?;
        tx.set_id()?;

        assert!(matches!(
            tx.validate(&index, &Secp256k1Verifier::new()),
            Err(InvalidReason::DoubleSpend { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_identity_checks() -> Result<()> {
        let alice = KeyPair::new()?;
        let (index, coinbase) = funded(&alice, Amount::from_coins(50));
        let verifier = Secp256k1Verifier::new();

        let mut unidentified = Transaction::new(
            vec![TxInput::spending(coinbase.id().unwrap(), 0).unwrap()],
            vec![TxOutput::new(Amount::from_coins(10), &alice.owner_hash())],
        );
        unidentified.sign_all(&alice)?;
        assert_eq!(unidentified.validate(&index, &verifier), Err(InvalidReason::MissingId));

        let mut forged = unidentified.clone();
        forged.id = Some("ff".repeat(32));
        assert!(matches!(forged.validate(&index, &verifier), Err(InvalidReason::IdMismatch { .. })));
        Ok(())
    }

    #[test]
    fn test_malformed_coinbase() {
        let mut tx = Transaction::new_coinbase(vec![1u8; 20], Amount::from_coins(50), "x");
        tx.outputs.push(TxOutput { value: Amount::from_coins(1), owner_hash: vec![2u8; 20] });
        tx.id = Some(tx.compute_id());

        assert_eq!(
            tx.validate(&UtxoIndex::new(), &Secp256k1Verifier::new()),
            Err(InvalidReason::MalformedCoinbase { outputs: 2 })
        );
    }

    #[test]
    fn test_missing_inputs_and_outputs() {
        let verifier = Secp256k1Verifier::new();

        let mut no_inputs = Transaction::new(vec![], vec![TxOutput { value: Amount::from_coins(1), owner_hash: vec![1u8; 20] }]);
        no_inputs.set_id().unwrap();
        assert_eq!(no_inputs.validate(&UtxoIndex::new(), &verifier), Err(InvalidReason::MissingInputs));

        let mut no_outputs = Transaction::new(vec![TxInput::spending("aa", 0).unwrap()], vec![]);
        no_outputs.set_id().unwrap();
        assert_eq!(no_outputs.validate(&UtxoIndex::new(), &verifier), Err(InvalidReason::MissingOutputs));
    }

    #[test]
    fn test_json_encodes_bytes_as_hex() {
        let tx = Transaction::new_coinbase(vec![0xab; 20], Amount::from_coins(1), "tag");
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains(&"ab".repeat(20)));

        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }
}
