use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vcs_core::cpu_6502::{Cpu6502, Memory6502};

/// Simple memory implementation for benchmarking.
struct BenchMemory {
    ram: Vec<u8>,
}

impl BenchMemory {
    fn new() -> Self {
        let mut ram = vec![0; 0x10000];

        // Reset vector -> 0x8000.
        ram[0xFFFC] = 0x00;
        ram[0xFFFD] = 0x80;

        // A small arithmetic loop touching several addressing modes:
        //   LDA #$42 / STA $2000 / LDX #$10 / LDY #$20
        //   INX / INY / DEX / DEY / ADC #$01 / JMP $8000
        let program = [
            0xA9, 0x42, 0x8D, 0x00, 0x20, 0xA2, 0x10, 0xA0, 0x20, 0xE8, 0xC8, 0xCA, 0x88, 0x69,
            0x01, 0x4C, 0x00, 0x80,
        ];
        ram[0x8000..0x8000 + program.len()].copy_from_slice(&program);

        Self { ram }
    }
}

impl Memory6502 for BenchMemory {
    fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.ram[addr as usize] = val;
    }
}

fn bench_cpu_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_6502_step");

    group.bench_function("single_instruction", |b| {
        b.iter(|| {
            let mut cpu = Cpu6502::new(BenchMemory::new());
            cpu.reset();
            cpu.step();
            black_box(cpu.a);
        });
    });

    group.finish();
}

fn bench_cpu_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_6502_clock");

    // The per-cycle pacing path is what the console drives; measure it at
    // frame-sized batch counts.
    for cycle_count in [76u32, 1000, 19_876].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(cycle_count),
            cycle_count,
            |b, &count| {
                b.iter(|| {
                    let mut cpu = Cpu6502::new(BenchMemory::new());
                    cpu.reset();
                    for _ in 0..count {
                        cpu.clock();
                    }
                    black_box(cpu.total_cycles);
                });
            },
        );
    }

    group.finish();
}

fn bench_cpu_reset(c: &mut Criterion) {
    c.bench_function("cpu_6502_reset", |b| {
        let mut cpu = Cpu6502::new(BenchMemory::new());
        b.iter(|| {
            cpu.reset();
            black_box(cpu.pc);
        });
    });
}

criterion_group!(benches, bench_cpu_step, bench_cpu_clock, bench_cpu_reset);
criterion_main!(benches);
