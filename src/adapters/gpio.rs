//! Board adapter over `embedded-hal` 1.0 traits.
//!
//! Two PWM channels drive the contactor coils, one push-pull output
//! drives the interlock FET and two inputs read the aux contacts.  Any
//! HAL that implements `SetDutyCycle` / `OutputPin` / `InputPin` plugs in
//! here.
//!
//! ## Safety contract
//!
//! This driver is a dumb actuator.  A pin error is logged and the last
//! good input level is kept; the state machine sees a stuck contact and
//! faults on its own checks.

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::pwm::SetDutyCycle;
use log::error;

use crate::app::ports::{AuxLevels, AuxPort, Coil, CoilDrive, CoilPort};

pub struct PwmCoilDriver<P1, P2, IL, A1, A2> {
    coil1: P1,
    coil2: P2,
    interlock: IL,
    aux1: A1,
    aux2: A2,
    /// Timer period the hold counts are expressed against.
    period: u16,
    last_aux: AuxLevels,
}

impl<P1, P2, IL, A1, A2> PwmCoilDriver<P1, P2, IL, A1, A2>
where
    P1: SetDutyCycle,
    P2: SetDutyCycle,
    IL: OutputPin,
    A1: InputPin,
    A2: InputPin,
{
    /// Take ownership of the pins.  `period` is the configured PWM period
    /// (`ContactorConfig::pwm_period`).
    pub fn new(coil1: P1, coil2: P2, interlock: IL, aux1: A1, aux2: A2, period: u16) -> Self {
        Self {
            coil1,
            coil2,
            interlock,
            aux1,
            aux2,
            period,
            last_aux: AuxLevels::default(),
        }
    }

    /// Release the pins.
    pub fn release(self) -> (P1, P2, IL, A1, A2) {
        (self.coil1, self.coil2, self.interlock, self.aux1, self.aux2)
    }
}

/// Duty value for `drive` on a channel whose full scale is `max`.
pub fn duty_for(drive: CoilDrive, period: u16, max: u16) -> u16 {
    match drive {
        CoilDrive::Off => 0,
        CoilDrive::Full => max,
        CoilDrive::Hold(counts) => {
            let on = u32::from(counts) + 1;
            let scaled = on * u32::from(max) / (u32::from(period) + 1);
            scaled.min(u32::from(max)) as u16
        }
    }
}

fn drive_channel<P: SetDutyCycle>(pin: &mut P, drive: CoilDrive, period: u16, coil: Coil) {
    let duty = duty_for(drive, period, pin.max_duty_cycle());
    if pin.set_duty_cycle(duty).is_err() {
        error!("{:?}: duty {} rejected", coil, duty);
    }
}

impl<P1, P2, IL, A1, A2> CoilPort for PwmCoilDriver<P1, P2, IL, A1, A2>
where
    P1: SetDutyCycle,
    P2: SetDutyCycle,
    IL: OutputPin,
    A1: InputPin,
    A2: InputPin,
{
    fn set_coil(&mut self, coil: Coil, drive: CoilDrive) {
        match coil {
            Coil::One => drive_channel(&mut self.coil1, drive, self.period, coil),
            Coil::Two => drive_channel(&mut self.coil2, drive, self.period, coil),
        }
    }

    fn set_interlock(&mut self, on: bool) {
        let res = if on {
            self.interlock.set_high()
        } else {
            self.interlock.set_low()
        };
        if res.is_err() {
            error!("interlock write failed");
        }
    }
}

impl<P1, P2, IL, A1, A2> AuxPort for PwmCoilDriver<P1, P2, IL, A1, A2>
where
    P1: SetDutyCycle,
    P2: SetDutyCycle,
    IL: OutputPin,
    A1: InputPin,
    A2: InputPin,
{
    fn read_aux(&mut self) -> AuxLevels {
        match self.aux1.is_high() {
            Ok(level) => self.last_aux.aux1_high = level,
            Err(_) => error!("aux1 read failed"),
        }
        match self.aux2.is_high() {
            Ok(level) => self.last_aux.aux2_high = level,
            Err(_) => error!("aux2 read failed"),
        }
        self.last_aux
    }
}
