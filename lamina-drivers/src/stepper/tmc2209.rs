//! TMC2209 stepper driver (UART mode)
//!
//! The tilt and tower drivers share one single-wire UART at 115200 baud
//! (8N1) and are told apart by their slave address (MS1/MS2 pins).
//! Every moving profile carries its own torque settings, which are written
//! to the driver whenever the profile becomes active:
//!
//! - `IHOLD_IRUN`: run current from the profile, hold current scaled from it
//! - `SGTHRS`: StallGuard threshold, used for tilt stall detection
//! - `TCOOLTHRS`: velocity below which StallGuard and CoolStep are disabled
//!
//! # Write datagram
//!
//! - Sync byte: 0x05
//! - Slave address (0-3)
//! - Register address with the write bit (0x80)
//! - Data (4 bytes, big-endian)
//! - CRC8

use embedded_io::Write;
use lamina_core::motion::Axis;
use lamina_core::profiles::{MovingProfile, ProfileParams};
use lamina_core::traits::{StepperError, TorqueControl};

/// TMC2209 Register addresses
pub mod reg {
    /// General configuration
    pub const GCONF: u8 = 0x00;
    /// Global status flags
    pub const GSTAT: u8 = 0x01;
    /// Hold/run current settings
    pub const IHOLD_IRUN: u8 = 0x10;
    /// Power down delay
    pub const TPOWERDOWN: u8 = 0x11;
    /// Lower velocity for CoolStep/StallGuard
    pub const TCOOLTHRS: u8 = 0x14;
    /// StallGuard threshold
    pub const SGTHRS: u8 = 0x40;
    /// Chopper configuration
    pub const CHOPCONF: u8 = 0x6C;
    /// StealthChop PWM configuration
    pub const PWMCONF: u8 = 0x70;
}

/// UART sync byte for TMC2209
const SYNC_BYTE: u8 = 0x05;

/// Largest value of the 20 bit TCOOLTHRS register
const TCOOLTHRS_MAX: u32 = 0xF_FFFF;

/// Largest IRUN/IHOLD current scale
const CS_MAX: u8 = 31;

/// Per-driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tmc2209Config {
    /// UART address (0-3, set by MS1/MS2 pins)
    pub uart_address: u8,
    /// Hold current as a percentage of the profile's run current
    pub hold_percent: u8,
    /// Enable StealthChop mode (quiet operation)
    pub stealthchop: bool,
    /// Microstepping (1, 2, 4, 8, 16, 32, 64, 128, 256)
    pub microsteps: u16,
}

impl Tmc2209Config {
    /// Tilt driver at address 0
    pub const fn tilt() -> Self {
        Self {
            uart_address: 0,
            hold_percent: 50,
            stealthchop: false,
            microsteps: 16,
        }
    }

    /// Tower driver at address 1
    pub const fn tower() -> Self {
        Self {
            uart_address: 1,
            hold_percent: 50,
            stealthchop: true,
            microsteps: 16,
        }
    }

    /// Convert microsteps to MRES register value
    pub fn mres(&self) -> u8 {
        match self.microsteps {
            256 => 0,
            128 => 1,
            64 => 2,
            32 => 3,
            16 => 4,
            8 => 5,
            4 => 6,
            2 => 7,
            1 => 8,
            _ => 4,
        }
    }

    fn gconf(&self) -> u32 {
        // pdn_disable, mstep_reg_select, multistep_filt
        let mut gconf = (1 << 6) | (1 << 7) | (1 << 8);
        if !self.stealthchop {
            // en_spreadcycle
            gconf |= 1 << 2;
        }
        gconf
    }

    fn chopconf(&self) -> u32 {
        // TOFF = 5, HSTRT = 4, TBL = 2, intpol
        5 | (4 << 4) | (2 << 15) | ((self.mres() as u32) << 24) | (1 << 28)
    }

    fn pwmconf(&self) -> u32 {
        // PWM_OFS = 36, PWM_GRAD = 14, 23.4kHz, autoscale, autograd,
        // PWM_REG = 4, PWM_LIM = 12
        36 | (14 << 8) | (1 << 16) | (1 << 18) | (1 << 19) | (4 << 24) | (12 << 28)
    }

    /// IHOLD_IRUN value for a profile
    pub fn ihold_irun(&self, params: &ProfileParams) -> u32 {
        let irun = params.current.min(CS_MAX) as u32;
        let ihold = irun * self.hold_percent.min(100) as u32 / 100;
        let iholddelay = 6u32;
        (iholddelay << 16) | (irun << 8) | ihold
    }
}

/// CRC8 calculation for TMC2209 UART
///
/// Polynomial 0x07, each byte fed least significant bit first.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &byte| {
        (0..8).fold(crc, |crc, bit| {
            if (crc >> 7) ^ ((byte >> bit) & 0x01) != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            }
        })
    })
}

/// Build a write datagram for TMC2209
pub fn build_write_datagram(addr: u8, reg: u8, data: u32) -> [u8; 8] {
    let mut datagram = [0u8; 8];
    datagram[0] = SYNC_BYTE;
    datagram[1] = addr;
    datagram[2] = reg | 0x80;
    datagram[3..7].copy_from_slice(&data.to_be_bytes());
    datagram[7] = crc8(&datagram[..7]);
    datagram
}

/// Datagrams applying a profile's torque settings
pub fn profile_datagrams(config: &Tmc2209Config, params: &ProfileParams) -> [[u8; 8]; 3] {
    let addr = config.uart_address;
    [
        build_write_datagram(addr, reg::IHOLD_IRUN, config.ihold_irun(params)),
        build_write_datagram(addr, reg::SGTHRS, params.stallguard_threshold as u32),
        build_write_datagram(
            addr,
            reg::TCOOLTHRS,
            (params.coolstep_threshold as u32).min(TCOOLTHRS_MAX),
        ),
    ]
}

/// Datagrams bringing a driver out of reset
pub fn init_datagrams(config: &Tmc2209Config) -> [[u8; 8]; 5] {
    let addr = config.uart_address;
    [
        // Clear reset and error flags
        build_write_datagram(addr, reg::GSTAT, 0x07),
        build_write_datagram(addr, reg::GCONF, config.gconf()),
        build_write_datagram(addr, reg::CHOPCONF, config.chopconf()),
        build_write_datagram(addr, reg::TPOWERDOWN, 20),
        build_write_datagram(addr, reg::PWMCONF, config.pwmconf()),
    ]
}

/// Torque programming for the tilt and tower TMC2209 drivers
pub struct Tmc2209Torque<U> {
    uart: U,
    tilt: Tmc2209Config,
    tower: Tmc2209Config,
}

impl<U: Write> Tmc2209Torque<U> {
    /// Create the driver pair on a shared UART
    pub fn new(uart: U, tilt: Tmc2209Config, tower: Tmc2209Config) -> Self {
        Self { uart, tilt, tower }
    }

    /// Configuration of an axis' driver
    pub fn config(&self, axis: Axis) -> &Tmc2209Config {
        match axis {
            Axis::Tilt => &self.tilt,
            Axis::Tower => &self.tower,
        }
    }

    /// Write the chopper and power-down configuration to both drivers
    pub fn init(&mut self) -> Result<(), StepperError> {
        for config in [self.tilt, self.tower] {
            for datagram in init_datagrams(&config) {
                self.send(&datagram)?;
            }
        }
        self.flush()
    }

    /// Release the UART
    pub fn release(self) -> U {
        self.uart
    }

    fn send(&mut self, datagram: &[u8; 8]) -> Result<(), StepperError> {
        self.uart.write_all(datagram).map_err(|_| {
            warn!("TMC2209 UART write failed");
            StepperError::CommunicationError
        })
    }

    fn flush(&mut self) -> Result<(), StepperError> {
        self.uart
            .flush()
            .map_err(|_| StepperError::CommunicationError)
    }
}

impl<U: Write> TorqueControl for Tmc2209Torque<U> {
    fn apply(&mut self, axis: Axis, profile: &MovingProfile) -> Result<(), StepperError> {
        let datagrams = profile_datagrams(self.config(axis), &profile.params);
        for datagram in &datagrams {
            self.send(datagram)?;
        }
        self.flush()?;
        debug!(
            "TMC2209 {}: current {} sgthrs {}",
            axis,
            profile.params.current,
            profile.params.stallguard_threshold
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{ErrorKind, ErrorType};

    /// UART capturing written bytes
    #[derive(Default)]
    struct VecUart {
        bytes: heapless::Vec<u8, 128>,
        fail: bool,
        flushes: usize,
    }

    impl ErrorType for VecUart {
        type Error = ErrorKind;
    }

    impl Write for VecUart {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            self.bytes
                .extend_from_slice(buf)
                .map_err(|_| ErrorKind::OutOfMemory)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn profile(current: u8, sgthrs: u8, tcoolthrs: u16) -> MovingProfile {
        let params = ProfileParams {
            starting_steprate: 100,
            maximum_steprate: 400,
            acceleration: 200,
            deceleration: 200,
            current,
            stallguard_threshold: sgthrs,
            coolstep_threshold: tcoolthrs,
        };
        MovingProfile::new("layer400", Axis::Tilt, params).unwrap()
    }

    #[test]
    fn test_crc8_read_request() {
        // GCONF read request from the datasheet
        assert_eq!(crc8(&[0x05, 0x00, 0x00]), 0x48);
    }

    #[test]
    fn test_write_datagram() {
        let datagram = build_write_datagram(0, reg::GCONF, 0x00000140);

        assert_eq!(datagram[0], SYNC_BYTE);
        assert_eq!(datagram[1], 0);
        assert_eq!(datagram[2], reg::GCONF | 0x80);
        assert_eq!(&datagram[3..7], &[0x00, 0x00, 0x01, 0x40]);
        assert_eq!(datagram[7], crc8(&datagram[..7]));
    }

    #[test]
    fn test_ihold_irun_encoding() {
        let config = Tmc2209Config::tilt();
        let params = profile(20, 0, 0).params;
        let datagram = &profile_datagrams(&config, &params)[0];

        assert_eq!(
            datagram,
            &[0x05, 0x00, 0x90, 0x00, 0x06, 0x14, 0x0A, 0x24]
        );
    }

    #[test]
    fn test_current_clamped() {
        let config = Tmc2209Config::tilt();
        let value = config.ihold_irun(&profile(63, 0, 0).params);
        assert_eq!((value >> 8) & 0x1F, 31);
        assert_eq!(value & 0x1F, 15);
    }

    #[test]
    fn test_stallguard_datagrams() {
        let config = Tmc2209Config::tilt();
        let [_, sgthrs, tcoolthrs] = profile_datagrams(&config, &profile(20, 47, 1500).params);

        assert_eq!(
            sgthrs,
            [0x05, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x2F, 0x4F]
        );
        assert_eq!(tcoolthrs[2], reg::TCOOLTHRS | 0x80);
        assert_eq!(&tcoolthrs[3..7], &1500u32.to_be_bytes());
    }

    #[test]
    fn test_apply_writes_to_axis_address() {
        let mut torque =
            Tmc2209Torque::new(VecUart::default(), Tmc2209Config::tilt(), Tmc2209Config::tower());

        torque.apply(Axis::Tower, &profile(16, 0, 0)).unwrap();

        let uart = torque.release();
        assert_eq!(uart.bytes.len(), 24);
        assert_eq!(uart.flushes, 1);
        for datagram in uart.bytes.chunks(8) {
            assert_eq!(datagram[0], SYNC_BYTE);
            assert_eq!(datagram[1], 1);
            assert_eq!(datagram[7], crc8(&datagram[..7]));
        }
    }

    #[test]
    fn test_uart_failure() {
        let uart = VecUart {
            fail: true,
            ..Default::default()
        };
        let mut torque = Tmc2209Torque::new(uart, Tmc2209Config::tilt(), Tmc2209Config::tower());

        assert_eq!(
            torque.apply(Axis::Tilt, &profile(20, 0, 0)),
            Err(StepperError::CommunicationError)
        );
    }

    #[test]
    fn test_init_both_drivers() {
        let mut torque =
            Tmc2209Torque::new(VecUart::default(), Tmc2209Config::tilt(), Tmc2209Config::tower());
        torque.init().unwrap();

        let uart = torque.release();
        assert_eq!(uart.bytes.len(), 2 * 5 * 8);
        assert_eq!(uart.bytes[1], 0);
        assert_eq!(uart.bytes[5 * 8 + 1], 1);
    }

    #[test]
    fn test_mres_conversion() {
        let mut config = Tmc2209Config::tilt();
        assert_eq!(config.mres(), 4);

        config.microsteps = 256;
        assert_eq!(config.mres(), 0);

        config.microsteps = 1;
        assert_eq!(config.mres(), 8);
    }
}
