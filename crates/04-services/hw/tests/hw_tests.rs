//! Hardware device object driven through the `HwDevice` client.

use futures::executor::LocalPool;
use service_abi::{IoType, Status};
use services_fabric::HwDevice;
use services_hw::{start, HwDeviceConfig, HwDeviceObject};
use transport_fabric::{IrqLine, MemoryRegion};

fn device(pool: &LocalPool) -> HwDevice {
    let object = HwDeviceObject::new("nic0", &HwDeviceConfig::default());
    let connector = start(object, &pool.spawner()).unwrap();
    HwDevice::new(connector.connect().unwrap())
}

#[test]
fn pci_info_lists_bars_and_capabilities() {
    let mut pool = LocalPool::new();
    let device = device(&pool);
    let info = pool.run_until(device.get_pci_info()).unwrap();
    assert_eq!(info.bars.len(), 2);
    assert_eq!(info.bars[0].io_type, IoType::Memory);
    assert_eq!(info.bars[1].io_type, IoType::Port);
    assert_eq!(info.capabilities.len(), 1);
    assert_eq!(info.num_msis, 1);
}

#[test]
fn bar_and_irq_capabilities_are_handed_out() {
    let mut pool = LocalPool::new();
    let device = device(&pool);
    let (bar, irq, msi) = pool.run_until(async {
        (
            device.access_bar(0).await.unwrap(),
            device.access_irq(0).await.unwrap(),
            device.install_msi(0).await.unwrap(),
        )
    });
    assert_eq!(
        bar,
        MemoryRegion {
            base: 0xfebc_0000,
            len: 0x2_0000,
        }
    );
    assert_eq!(irq, IrqLine { line: 11 });
    assert_eq!(msi, IrqLine { line: 64 });
}

#[test]
fn rejected_capability_request_leaves_the_lane_usable() {
    let mut pool = LocalPool::new();
    let device = device(&pool);
    let (rejected, follow_up) = pool.run_until(async {
        let rejected = device.access_bar(7).await;
        let follow_up = device.access_irq(0).await;
        (rejected, follow_up)
    });
    assert_eq!(rejected.unwrap_err().status(), Some(Status::OutOfBounds));
    assert_eq!(follow_up.unwrap(), IrqLine { line: 11 });
}

#[test]
fn device_can_be_claimed_once() {
    let mut pool = LocalPool::new();
    let device = device(&pool);
    let (first, second) = pool.run_until(async {
        (device.claim_device().await, device.claim_device().await)
    });
    assert!(first.is_ok());
    assert_eq!(second.unwrap_err().status(), Some(Status::AlreadyClaimed));
}

#[test]
fn enables_are_visible_in_the_command_register() {
    let mut pool = LocalPool::new();
    let device = device(&pool);
    let (before, after) = pool.run_until(async {
        let before = device.load_pci_space(0x04, 2).await.unwrap();
        device.enable_busmaster().await.unwrap();
        device.enable_bus_irq().await.unwrap();
        device.enable_msi().await.unwrap();
        let after = device.load_pci_space(0x04, 2).await.unwrap();
        (before, after)
    });
    assert_eq!(before, 1 << 10);
    assert_eq!(after, 1 << 2);
}

#[test]
fn config_space_round_trips_and_rejects_bad_accesses() {
    let mut pool = LocalPool::new();
    let device = device(&pool);
    let (stored, bad_size, out_of_range, capability) = pool.run_until(async {
        device.store_pci_space(0x40, 4, 0x1234_5678).await.unwrap();
        let stored = device.load_pci_space(0x40, 4).await.unwrap();
        let bad_size = device.load_pci_space(0x40, 3).await;
        let out_of_range = device.store_pci_space(0xff, 2, 0).await;
        let capability = device.load_pci_capability(0, 0, 1).await.unwrap();
        (stored, bad_size, out_of_range, capability)
    });
    assert_eq!(stored, 0x1234_5678);
    assert_eq!(bad_size.unwrap_err().status(), Some(Status::IllegalArguments));
    assert_eq!(out_of_range.unwrap_err().status(), Some(Status::OutOfBounds));
    assert_eq!(capability, 0x05);
}

#[test]
fn device_config_loads_from_toml() {
    let config: HwDeviceConfig = toml::from_str(
        r#"
        vendor_id = 0x1af4
        device_id = 0x1000
        irq_lines = [5, 9]

        [[bars]]
        io_type = "Memory"
        address = 0xfe000000
        length = 4096
        offset = 0
        "#,
    )
    .unwrap();
    assert_eq!(config.vendor_id, 0x1af4);
    assert_eq!(config.bars.len(), 1);
    assert_eq!(config.irq_lines, vec![5, 9]);
    assert_eq!(config.num_msis, HwDeviceConfig::default().num_msis);
}
