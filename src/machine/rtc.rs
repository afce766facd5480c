//! Real-time clock (MC146818 register map).
//!
//! Fourteen clock/control registers followed by 50 bytes of battery RAM.
//! Values read and write in BCD or binary per register B bit 2, hours in
//! 12- or 24-hour form per bit 1. The scheduler delivers one tick per
//! wall-clock second; the carry cascade handles month lengths and the
//! `year % 4 == 0` leap rule (no century exception in this era).

use std::sync::Arc;

use chrono::{Datelike, Local, Timelike};

use crate::signals::{Notify, SignalHub};

pub const RTC_REGISTER_COUNT: u16 = 64;

// Register indices.
const REG_SECOND: u16 = 0;
const REG_SECOND_ALARM: u16 = 1;
const REG_MINUTE: u16 = 2;
const REG_MINUTE_ALARM: u16 = 3;
const REG_HOUR: u16 = 4;
const REG_HOUR_ALARM: u16 = 5;
const REG_WEEKDAY: u16 = 6;
const REG_DAY: u16 = 7;
const REG_MONTH: u16 = 8;
const REG_YEAR: u16 = 9;
const REG_A: u16 = 10;
const REG_B: u16 = 11;
const REG_C: u16 = 12;
const REG_D: u16 = 13;
const RAM_BASE: u16 = 14;

// Register B bits.
const B_SET: u8 = 0x80;
const B_ALARM_IRQ_ENABLE: u8 = 0x20;
const B_UPDATE_IRQ_ENABLE: u8 = 0x10;
const B_BINARY: u8 = 0x04;
const B_24_HOURS: u8 = 0x02;

// Register C bits.
const C_IRQ: u8 = 0x80;
const C_ALARM_FLAG: u8 = 0x20;
const C_UPDATE_FLAG: u8 = 0x10;

// Register D: valid RAM and time.
const D_VALID: u8 = 0x80;

pub struct Rtc {
    second: u8,
    minute: u8,
    hour: u8,
    al_second: u8,
    al_minute: u8,
    al_hour: u8,
    weekday: u8,
    day: u8,
    month: u8,
    year: u8,
    reg_a: u8,
    reg_b: u8,
    reg_c: u8,
    ram: [u8; 50],
    hub: Arc<SignalHub>,
}

impl Rtc {
    pub fn new(hub: Arc<SignalHub>) -> Self {
        let mut rtc = Self {
            second: 0,
            minute: 0,
            hour: 0,
            al_second: 0,
            al_minute: 0,
            al_hour: 0,
            weekday: 1,
            day: 1,
            month: 1,
            year: 0,
            reg_a: 0,
            reg_b: B_24_HOURS,
            reg_c: 0,
            ram: [0; 50],
            hub,
        };
        rtc.load_host_time();
        rtc
    }

    /// Power-on: take over the host's local date and time.
    fn load_host_time(&mut self) {
        let now = Local::now();
        self.second = now.second() as u8;
        self.minute = now.minute() as u8;
        self.hour = now.hour() as u8;
        self.day = now.day() as u8;
        self.month = now.month() as u8;
        self.year = (now.year() % 100) as u8;
        self.weekday = now.weekday().number_from_sunday() as u8;
    }

    pub fn reset(&mut self) {
        self.reg_c = 0;
    }

    // ── Mode conversions ──────────────────────────────────────

    fn to_bcd(value: u8) -> u8 {
        ((value / 10) << 4) | (value % 10)
    }

    fn from_bcd(value: u8) -> u8 {
        (value >> 4) * 10 + (value & 0x0F)
    }

    fn encode(&self, value: u8) -> u8 {
        if self.reg_b & B_BINARY != 0 {
            value
        } else {
            Self::to_bcd(value)
        }
    }

    fn decode(&self, value: u8) -> u8 {
        if self.reg_b & B_BINARY != 0 {
            value
        } else {
            Self::from_bcd(value)
        }
    }

    fn encode_hour(&self, hour: u8) -> u8 {
        if self.reg_b & B_24_HOURS != 0 {
            return self.encode(hour);
        }
        // 12-hour mode: bit 7 flags PM, hour 0 reads as 12.
        let pm = hour >= 12;
        let mut h12 = hour % 12;
        if h12 == 0 {
            h12 = 12;
        }
        self.encode(h12) | if pm { 0x80 } else { 0 }
    }

    fn decode_hour(&self, value: u8) -> u8 {
        if self.reg_b & B_24_HOURS != 0 {
            return self.decode(value);
        }
        let pm = value & 0x80 != 0;
        let mut hour = self.decode(value & 0x7F) % 12;
        if pm {
            hour += 12;
        }
        hour
    }

    // ── Register file ─────────────────────────────────────────

    pub fn read(&mut self, offset: u16) -> u8 {
        match offset {
            REG_SECOND => self.encode(self.second),
            REG_SECOND_ALARM => self.encode(self.al_second),
            REG_MINUTE => self.encode(self.minute),
            REG_MINUTE_ALARM => self.encode(self.al_minute),
            REG_HOUR => self.encode_hour(self.hour),
            REG_HOUR_ALARM => self.encode_hour(self.al_hour),
            REG_WEEKDAY => self.encode(self.weekday),
            REG_DAY => self.encode(self.day),
            REG_MONTH => self.encode(self.month),
            REG_YEAR => self.encode(self.year),
            REG_A => self.reg_a & 0x7F,
            REG_B => self.reg_b,
            REG_C => {
                // Reading C clears the latched interrupt flags.
                let value = self.reg_c;
                self.reg_c = 0;
                value
            }
            REG_D => D_VALID,
            _ => self.ram[usize::from(offset - RAM_BASE) % self.ram.len()],
        }
    }

    pub fn write(&mut self, offset: u16, value: u8) {
        match offset {
            REG_SECOND => self.second = self.decode(value),
            REG_SECOND_ALARM => self.al_second = self.decode(value),
            REG_MINUTE => self.minute = self.decode(value),
            REG_MINUTE_ALARM => self.al_minute = self.decode(value),
            REG_HOUR => self.hour = self.decode_hour(value),
            REG_HOUR_ALARM => self.al_hour = self.decode_hour(value),
            REG_WEEKDAY => self.weekday = self.decode(value),
            REG_DAY => self.day = self.decode(value),
            REG_MONTH => self.month = self.decode(value),
            REG_YEAR => self.year = self.decode(value),
            REG_A => self.reg_a = value,
            REG_B => self.reg_b = value,
            REG_C | REG_D => {}
            _ => self.ram[usize::from(offset - RAM_BASE) % self.ram.len()] = value,
        }
    }

    // ── Once-per-second update ────────────────────────────────

    fn days_in_month(month: u8, year: u8) -> u8 {
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 => {
                if year % 4 == 0 {
                    29
                } else {
                    28
                }
            }
            _ => 31,
        }
    }

    pub fn update_1_second(&mut self) {
        if self.reg_b & B_SET != 0 {
            return;
        }

        self.second += 1;
        if self.second >= 60 {
            self.second = 0;
            self.minute += 1;
            if self.minute >= 60 {
                self.minute = 0;
                self.hour += 1;
                if self.hour >= 24 {
                    self.hour = 0;
                    self.weekday = self.weekday % 7 + 1;
                    self.day += 1;
                    if self.day > Self::days_in_month(self.month, self.year) {
                        self.day = 1;
                        self.month += 1;
                        if self.month > 12 {
                            self.month = 1;
                            self.year = (self.year + 1) % 100;
                        }
                    }
                }
            }
        }

        self.reg_c |= C_UPDATE_FLAG;
        let mut fire = self.reg_b & B_UPDATE_IRQ_ENABLE != 0;

        if self.second == self.al_second
            && self.minute == self.al_minute
            && self.hour == self.al_hour
        {
            self.reg_c |= C_ALARM_FLAG;
            if self.reg_b & B_ALARM_IRQ_ENABLE != 0 {
                fire = true;
            }
        }

        if fire {
            self.reg_c |= C_IRQ;
            self.hub.notify(Notify::SetIrq);
        }
    }
}
