//! Opcode dispatch: the main page and the 0x10 / 0x11 prefix pages.
//!
//! Each arm consumes its operands, performs the effect and returns the
//! instruction's cycle count; indexed modes accumulate their penalty into
//! the running count. Undocumented opcodes trap unless `use_undocumented`
//! is set.

use super::{BusIo, Mc6809, VECTOR_SWI, VECTOR_SWI2, VECTOR_SWI3};

impl Mc6809 {
    pub(super) fn exec_main(&mut self, bus: &mut impl BusIo, op: u8) -> u32 {
        let at = self.pc.wrapping_sub(1);
        match op {
            // ── Direct-page read-modify-write ─────────────────
            0x00 => {
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_neg);
                6
            }
            0x01 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_neg);
                6
            }
            0x02 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_negcom);
                6
            }
            0x03 => {
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_com);
                6
            }
            0x04 => {
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_lsr);
                6
            }
            0x05 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_lsr);
                6
            }
            0x06 => {
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_ror);
                6
            }
            0x07 => {
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_asr);
                6
            }
            0x08 => {
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_asl);
                6
            }
            0x09 => {
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_rol);
                6
            }
            0x0A => {
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_dec);
                6
            }
            0x0B => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_dec);
                6
            }
            0x0C => {
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_inc);
                6
            }
            0x0D => {
                let ea = self.ea_direct(bus);
                let value = bus.read_byte(ea);
                self.op_tst(value);
                6
            }
            0x0E => {
                self.pc = self.ea_direct(bus);
                3
            }
            0x0F => {
                let ea = self.ea_direct(bus);
                self.rmw(bus, ea, Self::op_clr);
                6
            }

            // ── Inherent / misc ───────────────────────────────
            0x12 => 2, // NOP
            0x13 => {
                self.op_sync();
                4
            }
            0x16 => {
                let offset = self.fetch16(bus);
                self.pc = self.pc.wrapping_add(offset);
                5
            }
            0x17 => {
                let offset = self.fetch16(bus);
                self.push16s(bus, self.pc);
                self.pc = self.pc.wrapping_add(offset);
                9
            }
            0x19 => {
                self.op_daa();
                2
            }
            0x1A => {
                let mask = self.fetch8(bus);
                self.cc |= mask;
                3
            }
            0x1C => {
                let mask = self.fetch8(bus);
                self.cc &= mask;
                3
            }
            0x1D => {
                self.op_sex();
                2
            }
            0x1E => {
                let post = self.fetch8(bus);
                self.op_exg(post);
                8
            }
            0x1F => {
                let post = self.fetch8(bus);
                self.op_tfr(post);
                6
            }

            // ── Short branches ────────────────────────────────
            0x20 => self.branch8(bus, true),
            0x21 => self.branch8(bus, false),
            0x22 => {
                let taken = self.cond_hi();
                self.branch8(bus, taken)
            }
            0x23 => {
                let taken = !self.cond_hi();
                self.branch8(bus, taken)
            }
            0x24 => {
                let taken = self.cond_cc();
                self.branch8(bus, taken)
            }
            0x25 => {
                let taken = !self.cond_cc();
                self.branch8(bus, taken)
            }
            0x26 => {
                let taken = self.cond_ne();
                self.branch8(bus, taken)
            }
            0x27 => {
                let taken = !self.cond_ne();
                self.branch8(bus, taken)
            }
            0x28 => {
                let taken = self.cond_vc();
                self.branch8(bus, taken)
            }
            0x29 => {
                let taken = !self.cond_vc();
                self.branch8(bus, taken)
            }
            0x2A => {
                let taken = self.cond_pl();
                self.branch8(bus, taken)
            }
            0x2B => {
                let taken = !self.cond_pl();
                self.branch8(bus, taken)
            }
            0x2C => {
                let taken = self.cond_ge();
                self.branch8(bus, taken)
            }
            0x2D => {
                let taken = !self.cond_ge();
                self.branch8(bus, taken)
            }
            0x2E => {
                let taken = self.cond_gt();
                self.branch8(bus, taken)
            }
            0x2F => {
                let taken = !self.cond_gt();
                self.branch8(bus, taken)
            }

            // ── LEA ───────────────────────────────────────────
            0x30 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                self.x = self.op_lea_z(ea);
                cy
            }
            0x31 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                self.y = self.op_lea_z(ea);
                cy
            }
            0x32 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                self.s = ea;
                cy
            }
            0x33 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                self.u = ea;
                cy
            }

            // ── Stack ops ─────────────────────────────────────
            0x34 => {
                let post = self.fetch8(bus);
                self.op_pshs(bus, post)
            }
            0x35 => {
                let post = self.fetch8(bus);
                self.op_puls(bus, post)
            }
            0x36 => {
                let post = self.fetch8(bus);
                self.op_pshu(bus, post)
            }
            0x37 => {
                let post = self.fetch8(bus);
                self.op_pulu(bus, post)
            }
            0x39 => {
                self.pc = self.pull16s(bus);
                5
            }
            0x3A => {
                self.op_abx();
                3
            }
            0x3B => self.op_rti(bus),
            0x3C => {
                let mask = self.fetch8(bus);
                self.op_cwai(bus, mask);
                20
            }
            0x3D => {
                self.op_mul();
                11
            }
            0x3E => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                self.op_rst(bus);
                19
            }
            0x3F => {
                self.op_swi(bus, VECTOR_SWI, true);
                19
            }

            // ── Inherent on A ─────────────────────────────────
            0x40 => {
                self.a = self.op_neg(self.a);
                2
            }
            0x41 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                self.a = self.op_neg(self.a);
                2
            }
            0x43 => {
                self.a = self.op_com(self.a);
                2
            }
            0x44 => {
                self.a = self.op_lsr(self.a);
                2
            }
            0x45 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                self.a = self.op_lsr(self.a);
                2
            }
            0x46 => {
                self.a = self.op_ror(self.a);
                2
            }
            0x47 => {
                self.a = self.op_asr(self.a);
                2
            }
            0x48 => {
                self.a = self.op_asl(self.a);
                2
            }
            0x49 => {
                self.a = self.op_rol(self.a);
                2
            }
            0x4A => {
                self.a = self.op_dec(self.a);
                2
            }
            0x4B => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                self.a = self.op_dec(self.a);
                2
            }
            0x4C => {
                self.a = self.op_inc(self.a);
                2
            }
            0x4D => {
                self.op_tst(self.a);
                2
            }
            0x4E => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                self.a = self.op_clr_keep_carry(self.a);
                2
            }
            0x4F => {
                self.a = self.op_clr(self.a);
                2
            }

            // ── Inherent on B ─────────────────────────────────
            0x50 => {
                self.b = self.op_neg(self.b);
                2
            }
            0x51 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                self.b = self.op_neg(self.b);
                2
            }
            0x53 => {
                self.b = self.op_com(self.b);
                2
            }
            0x54 => {
                self.b = self.op_lsr(self.b);
                2
            }
            0x55 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                self.b = self.op_lsr(self.b);
                2
            }
            0x56 => {
                self.b = self.op_ror(self.b);
                2
            }
            0x57 => {
                self.b = self.op_asr(self.b);
                2
            }
            0x58 => {
                self.b = self.op_asl(self.b);
                2
            }
            0x59 => {
                self.b = self.op_rol(self.b);
                2
            }
            0x5A => {
                self.b = self.op_dec(self.b);
                2
            }
            0x5B => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                self.b = self.op_dec(self.b);
                2
            }
            0x5C => {
                self.b = self.op_inc(self.b);
                2
            }
            0x5D => {
                self.op_tst(self.b);
                2
            }
            0x5E => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                self.b = self.op_clr_keep_carry(self.b);
                2
            }
            0x5F => {
                self.b = self.op_clr(self.b);
                2
            }

            // ── Indexed read-modify-write ─────────────────────
            0x60 => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_neg);
                cy
            }
            0x61 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_neg);
                cy
            }
            0x62 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_negcom);
                cy
            }
            0x63 => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_com);
                cy
            }
            0x64 => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_lsr);
                cy
            }
            0x65 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_lsr);
                cy
            }
            0x66 => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_ror);
                cy
            }
            0x67 => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_asr);
                cy
            }
            0x68 => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_asl);
                cy
            }
            0x69 => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_rol);
                cy
            }
            0x6A => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_dec);
                cy
            }
            0x6B => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_dec);
                cy
            }
            0x6C => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_inc);
                cy
            }
            0x6D => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                let value = bus.read_byte(ea);
                self.op_tst(value);
                cy
            }
            0x6E => {
                let mut cy = 3;
                self.pc = self.ea_indexed(bus, &mut cy);
                cy
            }
            0x6F => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                self.rmw(bus, ea, Self::op_clr);
                cy
            }

            // ── Extended read-modify-write ────────────────────
            0x70 => {
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_neg);
                7
            }
            0x71 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_neg);
                7
            }
            0x72 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_negcom);
                7
            }
            0x73 => {
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_com);
                7
            }
            0x74 => {
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_lsr);
                7
            }
            0x75 => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_lsr);
                7
            }
            0x76 => {
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_ror);
                7
            }
            0x77 => {
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_asr);
                7
            }
            0x78 => {
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_asl);
                7
            }
            0x79 => {
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_rol);
                7
            }
            0x7A => {
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_dec);
                7
            }
            0x7B => {
                if !self.use_undocumented {
                    return self.invalid(at);
                }
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_dec);
                7
            }
            0x7C => {
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_inc);
                7
            }
            0x7D => {
                let ea = self.ea_extended(bus);
                let value = bus.read_byte(ea);
                self.op_tst(value);
                7
            }
            0x7E => {
                self.pc = self.ea_extended(bus);
                4
            }
            0x7F => {
                let ea = self.ea_extended(bus);
                self.rmw(bus, ea, Self::op_clr);
                7
            }

            // ── A / D / X column, immediate ───────────────────
            0x80 => {
                let m = self.fetch8(bus);
                self.a = self.op_sub8(self.a, m);
                2
            }
            0x81 => {
                let m = self.fetch8(bus);
                self.op_cmp8(self.a, m);
                2
            }
            0x82 => {
                let m = self.fetch8(bus);
                self.a = self.op_sbc8(self.a, m);
                2
            }
            0x83 => {
                let m = self.fetch16(bus);
                let d = self.op_sub16(self.d(), m);
                self.set_d(d);
                4
            }
            0x84 => {
                let m = self.fetch8(bus);
                self.a = self.op_and8(self.a, m);
                2
            }
            0x85 => {
                let m = self.fetch8(bus);
                self.op_bit8(self.a, m);
                2
            }
            0x86 => {
                let m = self.fetch8(bus);
                self.a = self.op_ld8(m);
                2
            }
            0x88 => {
                let m = self.fetch8(bus);
                self.a = self.op_eor8(self.a, m);
                2
            }
            0x89 => {
                let m = self.fetch8(bus);
                self.a = self.op_adc8(self.a, m);
                2
            }
            0x8A => {
                let m = self.fetch8(bus);
                self.a = self.op_or8(self.a, m);
                2
            }
            0x8B => {
                let m = self.fetch8(bus);
                self.a = self.op_add8(self.a, m);
                2
            }
            0x8C => {
                let m = self.fetch16(bus);
                self.op_cmp16(self.x, m);
                4
            }
            0x8D => {
                let offset = self.fetch8(bus) as i8;
                self.push16s(bus, self.pc);
                self.pc = self.pc.wrapping_add(offset as u16);
                7
            }
            0x8E => {
                let m = self.fetch16(bus);
                self.x = self.op_ld16(m);
                3
            }

            // ── A / D / X column, direct ──────────────────────
            0x90 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_sub8(self.a, m);
                4
            }
            0x91 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.op_cmp8(self.a, m);
                4
            }
            0x92 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_sbc8(self.a, m);
                4
            }
            0x93 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                let d = self.op_sub16(self.d(), m);
                self.set_d(d);
                6
            }
            0x94 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_and8(self.a, m);
                4
            }
            0x95 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.op_bit8(self.a, m);
                4
            }
            0x96 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_ld8(m);
                4
            }
            0x97 => {
                let ea = self.ea_direct(bus);
                let v = self.op_st8(self.a);
                bus.write_byte(ea, v);
                4
            }
            0x98 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_eor8(self.a, m);
                4
            }
            0x99 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_adc8(self.a, m);
                4
            }
            0x9A => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_or8(self.a, m);
                4
            }
            0x9B => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_add8(self.a, m);
                4
            }
            0x9C => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                self.op_cmp16(self.x, m);
                6
            }
            0x9D => {
                let ea = self.ea_direct(bus);
                self.push16s(bus, self.pc);
                self.pc = ea;
                7
            }
            0x9E => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                self.x = self.op_ld16(m);
                5
            }
            0x9F => {
                let ea = self.ea_direct(bus);
                let v = self.op_st16(self.x);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                5
            }

            // ── A / D / X column, indexed ─────────────────────
            0xA0 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.a = self.op_sub8(self.a, m);
                cy
            }
            0xA1 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.op_cmp8(self.a, m);
                cy
            }
            0xA2 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.a = self.op_sbc8(self.a, m);
                cy
            }
            0xA3 => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                let d = self.op_sub16(self.d(), m);
                self.set_d(d);
                cy
            }
            0xA4 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.a = self.op_and8(self.a, m);
                cy
            }
            0xA5 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.op_bit8(self.a, m);
                cy
            }
            0xA6 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.a = self.op_ld8(m);
                cy
            }
            0xA7 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let v = self.op_st8(self.a);
                bus.write_byte(ea, v);
                cy
            }
            0xA8 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.a = self.op_eor8(self.a, m);
                cy
            }
            0xA9 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.a = self.op_adc8(self.a, m);
                cy
            }
            0xAA => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.a = self.op_or8(self.a, m);
                cy
            }
            0xAB => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.a = self.op_add8(self.a, m);
                cy
            }
            0xAC => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                self.op_cmp16(self.x, m);
                cy
            }
            0xAD => {
                let mut cy = 7;
                let ea = self.ea_indexed(bus, &mut cy);
                self.push16s(bus, self.pc);
                self.pc = ea;
                cy
            }
            0xAE => {
                let mut cy = 5;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                self.x = self.op_ld16(m);
                cy
            }
            0xAF => {
                let mut cy = 5;
                let ea = self.ea_indexed(bus, &mut cy);
                let v = self.op_st16(self.x);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                cy
            }

            // ── A / D / X column, extended ────────────────────
            0xB0 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_sub8(self.a, m);
                5
            }
            0xB1 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.op_cmp8(self.a, m);
                5
            }
            0xB2 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_sbc8(self.a, m);
                5
            }
            0xB3 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                let d = self.op_sub16(self.d(), m);
                self.set_d(d);
                7
            }
            0xB4 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_and8(self.a, m);
                5
            }
            0xB5 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.op_bit8(self.a, m);
                5
            }
            0xB6 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_ld8(m);
                5
            }
            0xB7 => {
                let ea = self.ea_extended(bus);
                let v = self.op_st8(self.a);
                bus.write_byte(ea, v);
                5
            }
            0xB8 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_eor8(self.a, m);
                5
            }
            0xB9 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_adc8(self.a, m);
                5
            }
            0xBA => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_or8(self.a, m);
                5
            }
            0xBB => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.a = self.op_add8(self.a, m);
                5
            }
            0xBC => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                self.op_cmp16(self.x, m);
                7
            }
            0xBD => {
                let ea = self.ea_extended(bus);
                self.push16s(bus, self.pc);
                self.pc = ea;
                8
            }
            0xBE => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                self.x = self.op_ld16(m);
                6
            }
            0xBF => {
                let ea = self.ea_extended(bus);
                let v = self.op_st16(self.x);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                6
            }

            // ── B / D / U column, immediate ───────────────────
            0xC0 => {
                let m = self.fetch8(bus);
                self.b = self.op_sub8(self.b, m);
                2
            }
            0xC1 => {
                let m = self.fetch8(bus);
                self.op_cmp8(self.b, m);
                2
            }
            0xC2 => {
                let m = self.fetch8(bus);
                self.b = self.op_sbc8(self.b, m);
                2
            }
            0xC3 => {
                let m = self.fetch16(bus);
                let d = self.op_add16(self.d(), m);
                self.set_d(d);
                4
            }
            0xC4 => {
                let m = self.fetch8(bus);
                self.b = self.op_and8(self.b, m);
                2
            }
            0xC5 => {
                let m = self.fetch8(bus);
                self.op_bit8(self.b, m);
                2
            }
            0xC6 => {
                let m = self.fetch8(bus);
                self.b = self.op_ld8(m);
                2
            }
            0xC8 => {
                let m = self.fetch8(bus);
                self.b = self.op_eor8(self.b, m);
                2
            }
            0xC9 => {
                let m = self.fetch8(bus);
                self.b = self.op_adc8(self.b, m);
                2
            }
            0xCA => {
                let m = self.fetch8(bus);
                self.b = self.op_or8(self.b, m);
                2
            }
            0xCB => {
                let m = self.fetch8(bus);
                self.b = self.op_add8(self.b, m);
                2
            }
            0xCC => {
                let m = self.fetch16(bus);
                let d = self.op_ld16(m);
                self.set_d(d);
                3
            }
            0xCE => {
                let m = self.fetch16(bus);
                self.u = self.op_ld16(m);
                3
            }

            // ── B / D / U column, direct ──────────────────────
            0xD0 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_sub8(self.b, m);
                4
            }
            0xD1 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.op_cmp8(self.b, m);
                4
            }
            0xD2 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_sbc8(self.b, m);
                4
            }
            0xD3 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                let d = self.op_add16(self.d(), m);
                self.set_d(d);
                6
            }
            0xD4 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_and8(self.b, m);
                4
            }
            0xD5 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.op_bit8(self.b, m);
                4
            }
            0xD6 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_ld8(m);
                4
            }
            0xD7 => {
                let ea = self.ea_direct(bus);
                let v = self.op_st8(self.b);
                bus.write_byte(ea, v);
                4
            }
            0xD8 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_eor8(self.b, m);
                4
            }
            0xD9 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_adc8(self.b, m);
                4
            }
            0xDA => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_or8(self.b, m);
                4
            }
            0xDB => {
                let ea = self.ea_direct(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_add8(self.b, m);
                4
            }
            0xDC => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                let d = self.op_ld16(m);
                self.set_d(d);
                5
            }
            0xDD => {
                let ea = self.ea_direct(bus);
                let v = self.op_st16(self.d());
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                5
            }
            0xDE => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                self.u = self.op_ld16(m);
                5
            }
            0xDF => {
                let ea = self.ea_direct(bus);
                let v = self.op_st16(self.u);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                5
            }

            // ── B / D / U column, indexed ─────────────────────
            0xE0 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.b = self.op_sub8(self.b, m);
                cy
            }
            0xE1 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.op_cmp8(self.b, m);
                cy
            }
            0xE2 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.b = self.op_sbc8(self.b, m);
                cy
            }
            0xE3 => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                let d = self.op_add16(self.d(), m);
                self.set_d(d);
                cy
            }
            0xE4 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.b = self.op_and8(self.b, m);
                cy
            }
            0xE5 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.op_bit8(self.b, m);
                cy
            }
            0xE6 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.b = self.op_ld8(m);
                cy
            }
            0xE7 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let v = self.op_st8(self.b);
                bus.write_byte(ea, v);
                cy
            }
            0xE8 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.b = self.op_eor8(self.b, m);
                cy
            }
            0xE9 => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.b = self.op_adc8(self.b, m);
                cy
            }
            0xEA => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.b = self.op_or8(self.b, m);
                cy
            }
            0xEB => {
                let mut cy = 4;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_byte(ea);
                self.b = self.op_add8(self.b, m);
                cy
            }
            0xEC => {
                let mut cy = 5;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                let d = self.op_ld16(m);
                self.set_d(d);
                cy
            }
            0xED => {
                let mut cy = 5;
                let ea = self.ea_indexed(bus, &mut cy);
                let v = self.op_st16(self.d());
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                cy
            }
            0xEE => {
                let mut cy = 5;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                self.u = self.op_ld16(m);
                cy
            }
            0xEF => {
                let mut cy = 5;
                let ea = self.ea_indexed(bus, &mut cy);
                let v = self.op_st16(self.u);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                cy
            }

            // ── B / D / U column, extended ────────────────────
            0xF0 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_sub8(self.b, m);
                5
            }
            0xF1 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.op_cmp8(self.b, m);
                5
            }
            0xF2 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_sbc8(self.b, m);
                5
            }
            0xF3 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                let d = self.op_add16(self.d(), m);
                self.set_d(d);
                7
            }
            0xF4 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_and8(self.b, m);
                5
            }
            0xF5 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.op_bit8(self.b, m);
                5
            }
            0xF6 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_ld8(m);
                5
            }
            0xF7 => {
                let ea = self.ea_extended(bus);
                let v = self.op_st8(self.b);
                bus.write_byte(ea, v);
                5
            }
            0xF8 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_eor8(self.b, m);
                5
            }
            0xF9 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_adc8(self.b, m);
                5
            }
            0xFA => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_or8(self.b, m);
                5
            }
            0xFB => {
                let ea = self.ea_extended(bus);
                let m = bus.read_byte(ea);
                self.b = self.op_add8(self.b, m);
                5
            }
            0xFC => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                let d = self.op_ld16(m);
                self.set_d(d);
                6
            }
            0xFD => {
                let ea = self.ea_extended(bus);
                let v = self.op_st16(self.d());
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                6
            }
            0xFE => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                self.u = self.op_ld16(m);
                6
            }
            0xFF => {
                let ea = self.ea_extended(bus);
                let v = self.op_st16(self.u);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                6
            }

            _ => self.invalid(at),
        }
    }

    /// 0x10-prefixed opcodes: long branches, SWI2, the Y and S columns.
    pub(super) fn exec_page10(&mut self, bus: &mut impl BusIo, op: u8) -> u32 {
        let at = self.pc.wrapping_sub(2);
        match op {
            0x21 => {
                // LBRN: never taken, always 5.
                self.pc = self.pc.wrapping_add(2);
                5
            }
            0x22 => {
                let taken = self.cond_hi();
                self.branch16(bus, taken)
            }
            0x23 => {
                let taken = !self.cond_hi();
                self.branch16(bus, taken)
            }
            0x24 => {
                let taken = self.cond_cc();
                self.branch16(bus, taken)
            }
            0x25 => {
                let taken = !self.cond_cc();
                self.branch16(bus, taken)
            }
            0x26 => {
                let taken = self.cond_ne();
                self.branch16(bus, taken)
            }
            0x27 => {
                let taken = !self.cond_ne();
                self.branch16(bus, taken)
            }
            0x28 => {
                let taken = self.cond_vc();
                self.branch16(bus, taken)
            }
            0x29 => {
                let taken = !self.cond_vc();
                self.branch16(bus, taken)
            }
            0x2A => {
                let taken = self.cond_pl();
                self.branch16(bus, taken)
            }
            0x2B => {
                let taken = !self.cond_pl();
                self.branch16(bus, taken)
            }
            0x2C => {
                let taken = self.cond_ge();
                self.branch16(bus, taken)
            }
            0x2D => {
                let taken = !self.cond_ge();
                self.branch16(bus, taken)
            }
            0x2E => {
                let taken = self.cond_gt();
                self.branch16(bus, taken)
            }
            0x2F => {
                let taken = !self.cond_gt();
                self.branch16(bus, taken)
            }
            0x3F => {
                self.op_swi(bus, VECTOR_SWI2, false);
                20
            }

            0x83 => {
                let m = self.fetch16(bus);
                self.op_cmp16(self.d(), m);
                5
            }
            0x8C => {
                let m = self.fetch16(bus);
                self.op_cmp16(self.y, m);
                5
            }
            0x8E => {
                let m = self.fetch16(bus);
                self.y = self.op_ld16(m);
                4
            }
            0x93 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                self.op_cmp16(self.d(), m);
                7
            }
            0x9C => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                self.op_cmp16(self.y, m);
                7
            }
            0x9E => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                self.y = self.op_ld16(m);
                6
            }
            0x9F => {
                let ea = self.ea_direct(bus);
                let v = self.op_st16(self.y);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                6
            }
            0xA3 => {
                let mut cy = 7;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                self.op_cmp16(self.d(), m);
                cy
            }
            0xAC => {
                let mut cy = 7;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                self.op_cmp16(self.y, m);
                cy
            }
            0xAE => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                self.y = self.op_ld16(m);
                cy
            }
            0xAF => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                let v = self.op_st16(self.y);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                cy
            }
            0xB3 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                self.op_cmp16(self.d(), m);
                8
            }
            0xBC => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                self.op_cmp16(self.y, m);
                8
            }
            0xBE => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                self.y = self.op_ld16(m);
                7
            }
            0xBF => {
                let ea = self.ea_extended(bus);
                let v = self.op_st16(self.y);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                7
            }

            0xCE => {
                let m = self.fetch16(bus);
                self.s = self.op_ld16(m);
                4
            }
            0xDE => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                self.s = self.op_ld16(m);
                6
            }
            0xDF => {
                let ea = self.ea_direct(bus);
                let v = self.op_st16(self.s);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                6
            }
            0xEE => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                self.s = self.op_ld16(m);
                cy
            }
            0xEF => {
                let mut cy = 6;
                let ea = self.ea_indexed(bus, &mut cy);
                let v = self.op_st16(self.s);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                cy
            }
            0xFE => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                self.s = self.op_ld16(m);
                7
            }
            0xFF => {
                let ea = self.ea_extended(bus);
                let v = self.op_st16(self.s);
                bus.write_byte(ea, (v >> 8) as u8);
                bus.write_byte(ea.wrapping_add(1), v as u8);
                7
            }

            _ => self.invalid(at),
        }
    }

    /// 0x11-prefixed opcodes: SWI3, CMPU, CMPS.
    pub(super) fn exec_page11(&mut self, bus: &mut impl BusIo, op: u8) -> u32 {
        let at = self.pc.wrapping_sub(2);
        match op {
            0x3F => {
                self.op_swi(bus, VECTOR_SWI3, false);
                20
            }
            0x83 => {
                let m = self.fetch16(bus);
                self.op_cmp16(self.u, m);
                5
            }
            0x8C => {
                let m = self.fetch16(bus);
                self.op_cmp16(self.s, m);
                5
            }
            0x93 => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                self.op_cmp16(self.u, m);
                7
            }
            0x9C => {
                let ea = self.ea_direct(bus);
                let m = bus.read_word(ea);
                self.op_cmp16(self.s, m);
                7
            }
            0xA3 => {
                let mut cy = 7;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                self.op_cmp16(self.u, m);
                cy
            }
            0xAC => {
                let mut cy = 7;
                let ea = self.ea_indexed(bus, &mut cy);
                let m = bus.read_word(ea);
                self.op_cmp16(self.s, m);
                cy
            }
            0xB3 => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                self.op_cmp16(self.u, m);
                8
            }
            0xBC => {
                let ea = self.ea_extended(bus);
                let m = bus.read_word(ea);
                self.op_cmp16(self.s, m);
                8
            }
            _ => self.invalid(at),
        }
    }
}
