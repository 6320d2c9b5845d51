//! Destination leg: moves the settled amount into the custody contract.

use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use tracing::{info, warn};

use st0x_evm::EvmError;

use super::{DepositError, DepositSettings};
use crate::usdc::{Usdc, from_base_units};
use crate::wallet::WalletCtx;

sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// Rejects `amount` (base units of a `decimals` token) when it is below
/// `minimum`. Returns the amount as a dollar value otherwise.
pub fn check_minimum(amount: U256, decimals: u8, minimum: Usdc) -> Result<Usdc, DepositError> {
    let amount = Usdc::new(from_base_units(amount, decimals)?);

    if amount < minimum {
        return Err(DepositError::BelowMinimum { amount, minimum });
    }

    Ok(amount)
}

/// A submitted custody transfer, not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SubmittedTransfer {
    pub(super) tx_hash: TxHash,
}

pub(super) struct CustodyLeg<'a> {
    wallet: &'a WalletCtx,
    settings: &'a DepositSettings,
}

impl<'a> CustodyLeg<'a> {
    pub(super) const fn new(wallet: &'a WalletCtx, settings: &'a DepositSettings) -> Self {
        Self { wallet, settings }
    }

    /// Checks the floor and the balance, then submits the transfer.
    pub(super) async fn submit(&self, amount: U256) -> Result<SubmittedTransfer, DepositError> {
        let destination = self.settings.destination;
        let decimals = self.settings.destination_decimals;

        check_minimum(amount, decimals, self.settings.minimum).inspect_err(|err| {
            warn!(%amount, %err, "Deposit rejected before transfer");
        })?;

        let wallet = self
            .wallet
            .ensure_chain(destination.chain_id)
            .await
            .map_err(DepositError::Chain)?;

        let held = self.balance(self.wallet.address()).await?;
        if held < amount {
            return Err(DepositError::InsufficientBalance {
                held: from_base_units(held, decimals)?,
                required: from_base_units(amount, decimals)?,
            });
        }

        let call = IERC20::transferCall {
            to: self.settings.custody_contract,
            amount,
        };
        let tx = TransactionRequest::default()
            .to(destination.token)
            .input(call.abi_encode().into());

        let tx_hash = wallet
            .send_transaction(destination.chain_id, tx)
            .await
            .map_err(DepositError::Submission)?;

        info!(
            %tx_hash,
            %amount,
            custody = %self.settings.custody_contract,
            "Deposit transfer submitted"
        );

        Ok(SubmittedTransfer { tx_hash })
    }

    /// Waits for a submitted transfer to be included.
    pub(super) async fn confirm(&self, transfer: SubmittedTransfer) -> Result<(), DepositError> {
        let tx_hash = transfer.tx_hash;

        match self
            .wallet
            .wallet()
            .wait_for_confirmation(self.settings.destination.chain_id, tx_hash)
            .await
        {
            Ok(confirmation) => {
                info!(%tx_hash, block = ?confirmation.block_number, "Deposit transfer confirmed");
                Ok(())
            }
            Err(EvmError::Reverted { .. }) => Err(DepositError::Reverted { tx_hash }),
            Err(source) => Err(DepositError::ConfirmationFailed { tx_hash, source }),
        }
    }

    async fn balance(&self, owner: Address) -> Result<U256, DepositError> {
        let destination = self.settings.destination;
        let call = IERC20::balanceOfCall { account: owner };
        let tx = TransactionRequest::default()
            .to(destination.token)
            .input(call.abi_encode().into());

        let output = self
            .wallet
            .wallet()
            .call(destination.chain_id, tx)
            .await
            .map_err(DepositError::Balance)?;

        U256::try_from_be_slice(&output).ok_or_else(|| {
            DepositError::Balance(EvmError::Rejected {
                reason: format!("malformed balanceOf output: {output}"),
            })
        })
    }
}
