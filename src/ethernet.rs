//! Ethernet MAC collaborator (spec §1: out of core scope, interface level
//! only).
//!
//! A software-reset/link-up wrapper over [`regs::EthernetRegs`]; this crate
//! has no need of a full MAC/DMA descriptor ring, only enough control to
//! bring the link up or down around SGPIO reconfiguration.

use crate::fmt::trace;
use crate::regs::{self, EthernetRegs};

const MAC_CONFIG_TX_ENABLE: u32 = 1 << 3;
const MAC_CONFIG_RX_ENABLE: u32 = 1 << 2;
const DMA_BUS_MODE_SOFT_RESET: u32 = 1 << 0;

/// The single Ethernet MAC instance.
pub struct Ethernet {
    regs: &'static EthernetRegs,
}

impl Ethernet {
    /// Binds to the Ethernet MAC peripheral.
    ///
    /// # Safety
    /// Caller must not construct two `Ethernet`s at once.
    pub unsafe fn new() -> Self {
        Self { regs: unsafe { regs::ethernet() } }
    }

    /// Issues a DMA soft reset and blocks until the hardware clears it.
    pub fn reset(&self) {
        self.regs.dma_bus_mode.set_bits(DMA_BUS_MODE_SOFT_RESET);
        while self.regs.dma_bus_mode.read() & DMA_BUS_MODE_SOFT_RESET != 0 {}
        trace!("ethernet: reset complete");
    }

    /// Enables both the transmit and receive MAC paths.
    pub fn enable(&self) {
        self.regs.mac_config.set_bits(MAC_CONFIG_TX_ENABLE | MAC_CONFIG_RX_ENABLE);
    }

    /// Disables both the transmit and receive MAC paths.
    pub fn disable(&self) {
        self.regs.mac_config.clear_bits(MAC_CONFIG_TX_ENABLE | MAC_CONFIG_RX_ENABLE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registers() -> &'static EthernetRegs {
        Box::leak(Box::new(unsafe { core::mem::zeroed() }))
    }

    #[test]
    fn enable_sets_tx_and_rx_bits() {
        let regs = registers();
        let eth = Ethernet { regs };
        eth.enable();
        assert_eq!(regs.mac_config.read(), MAC_CONFIG_TX_ENABLE | MAC_CONFIG_RX_ENABLE);
    }
}
