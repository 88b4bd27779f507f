//! 정규화 벤치마크
//!
//! 포맷별 감지 → 파싱 → 매핑 → 검증 전체 경로의 처리량을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use graphwarden_core::types::FormatTag;
use graphwarden_normalize::{FormatDetector, Normalizer, ParserRegistry};

const NATIVE: &[u8] = br#"{"class_uid":3002,"category_uid":3,"time":"2024-01-15T12:00:00Z","severity":5,"message":"User login failed","metadata":{"version":"1.0.0","product":{"name":"Okta"}},"src_endpoint":{"ip":"192.168.1.100"},"actor":{"user":{"name":"alice","domain":"corp"}}}"#;

const SYSLOG_5424: &[u8] = b"<34>1 2024-01-15T12:00:00.123Z web-server-01 sshd 5678 ID123 [origin ip=\"192.168.1.100\"] Failed password for root from 192.168.1.100 port 52144 ssh2";

const SYSLOG_3164: &[u8] = b"<34>Jan 15 12:00:00 myhost sshd[1234]: Failed password for root";

const CEF: &[u8] = b"CEF:0|Palo Alto|PAN-OS|10.1|THREAT|Port scan detected|8|rt=1705320000000 src=192.168.1.100 spt=51000 dst=10.0.0.5 dpt=22 suser=alice act=deny msg=Repeated connection attempts";

const LEEF: &[u8] = b"LEEF:1.0|IBM|QRadar|7.5|4625|devTime=1705320000000\tsrc=192.168.1.100\tsrcPort=40000\tdst=10.0.0.5\tdstPort=22\tusrName=root\tsev=6";

fn bench_detect(c: &mut Criterion) {
    let detector = FormatDetector::default();
    let mut group = c.benchmark_group("detect");
    group.throughput(Throughput::Elements(1));

    for (name, input) in [("native", NATIVE), ("syslog", SYSLOG_5424), ("cef", CEF), ("leef", LEEF)] {
        group.bench_with_input(BenchmarkId::new("sniff", name), &input, |b, &input| {
            b.iter(|| detector.detect(black_box(input), None).unwrap())
        });
    }

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let parsers = ParserRegistry::with_defaults(64 * 1024);
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    let cases = [
        ("native", FormatTag::Native, NATIVE),
        ("syslog_rfc5424", FormatTag::Syslog, SYSLOG_5424),
        ("syslog_rfc3164", FormatTag::Syslog, SYSLOG_3164),
        ("cef", FormatTag::Cef, CEF),
        ("leef", FormatTag::Leef, LEEF),
    ];
    for (name, format, input) in cases {
        group.bench_with_input(BenchmarkId::new("format", name), &input, |b, &input| {
            b.iter(|| parsers.parse(format, black_box(input)).unwrap())
        });
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let normalizer = Normalizer::default();
    let mut group = c.benchmark_group("normalize");

    group.throughput(Throughput::Elements(1));
    group.bench_function("cef_single", |b| {
        b.iter(|| normalizer.normalize(black_box(CEF), None).unwrap())
    });

    // 혼합 포맷 1000건 처리량
    let mixed = [NATIVE, SYSLOG_5424, SYSLOG_3164, CEF, LEEF];
    group.throughput(Throughput::Elements(1000));
    group.bench_function("mixed_throughput_1000", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let raw = mixed[i % mixed.len()];
                normalizer.normalize(black_box(raw), None).unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_detect, bench_parse, bench_normalize);
criterion_main!(benches);
