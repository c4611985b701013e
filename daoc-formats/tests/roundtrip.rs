//! File-level round trips across the format adapters.

use std::io::Cursor;

use daoc_core::{ClusterOptions, Selected};
use daoc_formats::{
    ClsFmt, CnlParser, CnlPrinter, FileFormat, InputOptions, NslParser, RcgParser, RhbHierarchy,
};

fn input(format: FileFormat) -> InputOptions {
    InputOptions {
        format,
        ..InputOptions::default()
    }
}

#[test]
fn nse_to_rhb_file_roundtrip() {
    let net = "# Nodes: 6 Edges: 7 Weighted: 0\n0 1\n0 2\n1 2\n3 4\n3 5\n4 5\n2 3\n";
    let mut graph = NslParser::new(input(FileFormat::Nse))
        .parse(Cursor::new(net.as_bytes().to_vec()))
        .expect("network must parse");
    let hier = graph
        .build_hierarchy(&ClusterOptions::new())
        .expect("hierarchy");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("net_.rhb");
    let rendered = RhbHierarchy::render(&hier);
    let mut buf = Vec::new();
    rendered.print(&mut buf).expect("print");
    std::fs::write(&path, &buf).expect("write");

    let loaded = RhbHierarchy::load(&path).expect("reload");
    assert_eq!(loaded, rendered);
    let mut reprinted = Vec::new();
    loaded.print(&mut reprinted).expect("reprint");
    assert_eq!(reprinted, buf, "the RHB round trip must be byte-identical");
}

#[test]
fn rcg_and_nse_agree_on_the_same_network() {
    let rcg = "/Graph weighted:1\n/Nodes 4 0\n/Edges\n0> 1:1 3:1\n1> 2:1\n2> 3:1\n";
    let nse = "# Nodes: 4 Edges: 4 Weighted: 1\n0 1 1\n0 3 1\n1 2 1\n2 3 1\n";
    let mut ga = RcgParser::new(input(FileFormat::Rcg))
        .parse(Cursor::new(rcg.as_bytes().to_vec()))
        .expect("rcg parses");
    let mut gb = NslParser::new(input(FileFormat::Nse))
        .parse(Cursor::new(nse.as_bytes().to_vec()))
        .expect("nse parses");
    let ha = ga.build_hierarchy(&ClusterOptions::new()).expect("hierarchy");
    let hb = gb.build_hierarchy(&ClusterOptions::new()).expect("hierarchy");

    let cnl_of = |hier: &daoc_core::Hierarchy| {
        let top = hier.levels().len() - 1;
        let selection: Vec<_> = (0..hier.root().len())
            .map(|index| {
                let sel = Selected { level: top, index };
                (sel, hier.unwrap(top, index))
            })
            .collect();
        let mut buf = Vec::new();
        CnlPrinter::new(hier)
            .print(&mut buf, &selection, ClsFmt::Simple)
            .expect("print");
        String::from_utf8(buf).expect("utf8")
    };
    assert_eq!(cnl_of(&ha), cnl_of(&hb));
}

#[test]
fn cnl_file_reparses_to_the_same_membership() {
    let net = "# Nodes: 5 Edges: 5 Weighted: 0\n0 1\n0 2\n1 3\n3 4\n2 4\n";
    let mut graph = NslParser::new(input(FileFormat::Nse))
        .parse(Cursor::new(net.as_bytes().to_vec()))
        .expect("network must parse");
    let hier = graph
        .build_hierarchy(&ClusterOptions::new())
        .expect("hierarchy");
    let selection: Vec<_> = (0..hier.levels()[0].fullsize())
        .map(|index| {
            let sel = Selected { level: 0, index };
            (sel, hier.unwrap(0, index))
        })
        .collect();
    let mut buf = Vec::new();
    CnlPrinter::new(&hier)
        .print(&mut buf, &selection, ClsFmt::Extended)
        .expect("print");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bottom.cnl");
    std::fs::write(&path, &buf).expect("write");
    let loaded = CnlParser::load(&path).expect("reload");
    assert_eq!(loaded.clusters.len(), selection.len());
    for ((_, members), parsed) in selection.iter().zip(&loaded.clusters) {
        let expected: Vec<u32> = members
            .keys()
            .map(|&idx| hier.nodes()[idx].id)
            .collect();
        let got: Vec<u32> = parsed.iter().map(|&(id, _)| id).collect();
        assert_eq!(got, expected);
    }
}
