use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::Provider;

use crate::ledger::{DepositLedger, TransferReceipt};
use crate::{ArbiterError, ForcePaymentDeposit};

/// Query the deposit held by `owner`.
pub async fn balance_of<P: Provider>(
    rpc: &P,
    contract: Address,
    owner: Address,
) -> Result<U256, ArbiterError> {
    let deposit = ForcePaymentDeposit::new(contract, rpc);
    deposit
        .balanceOf(owner)
        .call()
        .await
        .map_err(|e| ArbiterError::LedgerError(format!("balanceOf failed: {e}")))
}

/// Execute `reimburseForNoPayment(requestor, provider, amount, closureTime)`.
/// Returns the transaction hash.
///
/// Both the send and the receipt wait are bounded: the caller holds the
/// requestor's lock for the whole call. A failure before broadcast or a
/// revert is a retryable [`ArbiterError::LedgerError`]; once the transaction
/// is out, a missing receipt is [`ArbiterError::TransferOutcomeUnknown`].
pub async fn reimburse_for_no_payment<P: Provider>(
    rpc: &P,
    contract: Address,
    requestor: Address,
    provider: Address,
    amount: U256,
    closure_time: u64,
) -> Result<TxHash, ArbiterError> {
    let deposit = ForcePaymentDeposit::new(contract, rpc);
    let pending = tokio::time::timeout(
        Duration::from_secs(30),
        deposit
            .reimburseForNoPayment(requestor, provider, amount, U256::from(closure_time))
            .send(),
    )
    .await
    .map_err(|_| ArbiterError::LedgerError("reimburse send timed out after 30s".to_string()))?
    .map_err(|e| ArbiterError::LedgerError(format!("reimburse send failed: {e}")))?;

    let tx_hash = *pending.tx_hash();
    let receipt = tokio::time::timeout(Duration::from_secs(60), pending.get_receipt())
        .await
        .map_err(|_| unconfirmed(tx_hash, "receipt timed out after 60s".to_string()))?
        .map_err(|e| unconfirmed(tx_hash, format!("receipt failed: {e}")))?;

    if !receipt.status() {
        return Err(ArbiterError::LedgerError(format!(
            "reimburse {tx_hash} reverted"
        )));
    }

    Ok(receipt.transaction_hash)
}

/// A broadcast transaction whose receipt could not be obtained.
fn unconfirmed(tx: TxHash, reason: String) -> ArbiterError {
    tracing::error!(tx = %tx, reason = %reason, "reimburse broadcast but not confirmed");
    ArbiterError::TransferOutcomeUnknown { tx, reason }
}

/// [`DepositLedger`] backed by the on-chain deposit contract.
pub struct ContractLedger<P> {
    rpc: P,
    contract: Address,
}

impl<P> ContractLedger<P> {
    pub fn new(rpc: P, contract: Address) -> Self {
        Self { rpc, contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }
}

impl<P> DepositLedger for ContractLedger<P>
where
    P: Provider + Send + Sync,
{
    async fn balance_of(&self, owner: Address) -> Result<U256, ArbiterError> {
        balance_of(&self.rpc, self.contract, owner).await
    }

    async fn transfer(
        &self,
        from: Address,
        to: Address,
        amount: U256,
        closure_time: u64,
    ) -> Result<TransferReceipt, ArbiterError> {
        let tx_hash =
            reimburse_for_no_payment(&self.rpc, self.contract, from, to, amount, closure_time)
                .await?;
        Ok(TransferReceipt {
            from,
            to,
            amount,
            transaction: Some(format!("{tx_hash}")),
        })
    }

    async fn health_check(&self) -> Result<u64, ArbiterError> {
        self.rpc
            .get_block_number()
            .await
            .map_err(|e| ArbiterError::LedgerError(format!("health check failed: {e}")))
    }
}
