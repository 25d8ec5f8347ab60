use std::collections::HashMap;

use kernel_xref::highlight::{BinaryAddress, Color, LineSelector};
use kernel_xref::views::{AnalysisView, KernelSummary, LineCorrelation, OccurrenceView};
use kernel_xref::{AnalysisKind, IndexError, IndexHandle, ResultIndex, ResultInputs};

const ADD: &str = "_Z3addPiS_S_";
const ZERO: &str = "_Z4zeroPi";

const SASS: &str = r#"//--------------------- .text._Z3addPiS_S_ --------------------------
	.section	.text._Z3addPiS_S_,"ax",@progbits
.text._Z3addPiS_S_:
	//## File "/build/add.cu", line 5
        /*0000*/                   MOV R1, c[0x0][0x28] ;
        /*0010*/                   S2R R0, SR_TID.X ;
	//## File "/build/helpers.cuh", line 3
        /*0020*/                   IADD3 R4, R0, 0x1, RZ ;
	//## File "/build/add.cu", line 7
        /*0030*/                   STL [R1], R4 ;
        /*0040*/                   @P0 BRA `(.L_x_1) ;
.L_x_1:
        /*0050*/                   EXIT ;

	.section	.text._Z4zeroPi,"ax",@progbits
	//## File "/build/add.cu", line 6
        /*0000*/                   STG.E [R2.64], RZ ;
        /*0010*/                   EXIT ;
"#;

const PTX: &str = r#".version 7.8
.target sm_80

.visible .entry _Z3addPiS_S_(
	.param .u64 _Z3addPiS_S__param_0
)
{
	.loc	1 5 0
	ld.param.u64 	%rd1, [_Z3addPiS_S__param_0];
	.loc	2 3 0
	add.s32 	%r4, %r1, 1;
	.loc	1 8 0
	st.local.u32 	[%rd2], %r4;
	ret;
}

	// .globl	_Z4zeroPi
.global .align 4 .u32 launches;

.visible .func _Z6bumpv()
{
	.loc	1 11 0
	atom.global.add.u32 	%r1, [launches], 1;
	ret;
}

.visible .entry _Z4zeroPi(
	.param .u64 _Z4zeroPi_param_0
)
{
	.loc	1 6 0
	st.global.u32 	[%rd1], 0;
	ret;
}
	.file	1 "/build/add.cu"
	.file	2 "/build/helpers.cuh"
"#;

const REPORT: &str = r#"{
    "file_renames": {
        "/build/add.cu": "/home/dev/add.cu",
        "/build/helpers.cuh": "/home/dev/helpers.cuh"
    },
    "register_spilling": {
        "_Z3addPiS_S_": {
            "metrics": {"spill_stores": 1, "spill_loads": null},
            "occurrences": [{"line_number": 7, "pc_offset": "0x30", "register": "R4", "spill_bytes": 4}]
        }
    },
    "branch_divergence": {
        "_Z3addPiS_S_": {
            "occurrences": [{"line_number": 7, "pc_offset": "0x40", "predicate": "P0",
                             "reconvergence_pc": "0x50", "divergence_ratio": 0.5}]
        }
    },
    "dependency_stall": {
        "_Z3addPiS_S_": {
            "occurrences": [{"line_number": 8, "ptx_line": 6, "register": "%r4", "producer_pc": 5}]
        }
    },
    "tensor_core_usage": {"_Z3addPiS_S_": {}}
}"#;

fn inputs() -> ResultInputs {
    let add: String = (1..=12).map(|i| format!("// add.cu {}\n", i)).collect();
    let helpers: String = (1..=6).map(|i| format!("// helpers.cuh {}\n", i)).collect();
    ResultInputs {
        machine_assembly: SASS.to_string(),
        intermediate_assembly: PTX.to_string(),
        report_json: REPORT.to_string(),
        sources: HashMap::from([
            ("/home/dev/add.cu".to_string(), add),
            ("/home/dev/helpers.cuh".to_string(), helpers),
        ]),
    }
}

fn build() -> ResultIndex {
    ResultIndex::build(&inputs(), 1).expect("Failed to build index")
}

#[test]
fn test_kernels_and_display_names() {
    let index = build();
    assert_eq!(index.kernel_names(), vec![ADD, ZERO]);
    assert_eq!(index.kernel(ADD).unwrap().display_name, "add(int*, int*, int*)");
    assert_eq!(index.kernel(ZERO).unwrap().display_name, "zero(int*)");

    let summaries = KernelSummary::all(&index);
    assert_eq!(summaries[0].machine_instructions, 6);
    // the device function and global between the two entries belong to neither kernel
    assert_eq!(summaries[0].intermediate_instructions, 8);
    assert_eq!(summaries[0].source_lines, 9);
    assert_eq!(summaries[1].intermediate_instructions, 6);
    assert_eq!(summaries[0].files, vec!["/build/add.cu", "/build/helpers.cuh"]);
    assert_eq!(summaries[1].analyses, Vec::<String>::new());
}

#[test]
fn test_synthetic_source_space() {
    let index = build();
    // add.cu 4..=8 (with context), separator, helpers.cuh 2..=3, separator
    let lines = index.source_lines(ADD);
    assert_eq!(lines.len(), 9);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line.address as usize, i + 1);
    }
    assert!(lines[5].is_separator());
    assert!(lines[8].is_separator());
    assert_eq!(lines[0].text(), "// add.cu 4");
    assert_eq!(lines[6].text(), "// helpers.cuh 2");

    assert_eq!(index.synthetic_line(ADD, "/build/add.cu", 7), Some(4));
    assert_eq!(index.synthetic_line(ADD, "/build/helpers.cuh", 3), Some(8));
    assert_eq!(index.synthetic_line(ADD, "/build/add.cu", 12), None);
    assert_eq!(index.synthetic_line(ADD, "/build/add.cu", 11), None);
}

#[test]
fn test_machine_and_intermediate_correlation() {
    let index = build();
    assert_eq!(index.machine_to_source(ADD, "0x0"), Some(2));
    assert_eq!(index.machine_to_source(ADD, "0x20"), Some(8));
    assert_eq!(index.machine_to_source(ADD, "0x50"), Some(4));
    assert_eq!(
        index.source_to_machine(ADD, 4),
        &["0x30".to_string(), "0x40".to_string(), "0x50".to_string()]
    );

    // .param, ), { take 1..=3 and carry no location
    assert_eq!(index.intermediate_to_source(ADD, 1), None);
    assert_eq!(index.intermediate_to_source(ADD, 4), Some(2));
    assert_eq!(index.intermediate_to_source(ADD, 5), Some(8));
    assert_eq!(index.source_to_intermediate(ADD, 5), &[6, 7, 8]);
}

#[test]
fn test_overlapping_kernels_are_independent() {
    let index = build();
    // add.cu:6 is shown by both kernels, at different synthetic lines
    assert_eq!(index.synthetic_line(ADD, "/build/add.cu", 6), Some(3));
    assert_eq!(index.synthetic_line(ZERO, "/build/add.cu", 6), Some(2));
    assert_eq!(index.machine_to_source(ZERO, "0x0"), Some(2));
    assert_eq!(index.intermediate_to_source(ZERO, 4), Some(2));
    assert_eq!(index.source_lines(ZERO).len(), 3);
    assert!(index.source_to_machine(ADD, 3).is_empty());
}

#[test]
fn test_inverse_maps_compose_to_identity() {
    let index = build();
    for kernel in index.kernels() {
        for (line, addresses) in &kernel.maps.source_to_machine {
            for address in addresses {
                assert_eq!(kernel.maps.machine_to_source.get(address), Some(line));
            }
        }
        for (line, addresses) in &kernel.maps.source_to_intermediate {
            for address in addresses {
                assert_eq!(kernel.maps.intermediate_to_source.get(address), Some(line));
            }
        }
    }
}

#[test]
fn test_report_analyses() {
    let index = build();
    assert_eq!(index.analysis_kinds().len(), 3);

    let spills = index.analysis(AnalysisKind::RegisterSpilling, ADD).unwrap();
    assert_eq!(spills.get_metric("spill_stores"), 1.0);
    assert_eq!(spills.get_metric("spill_loads"), 0.0);

    let at4 = index.occurrences_at_source_line(AnalysisKind::RegisterSpilling, ADD, 4);
    assert_eq!(at4.len(), 1);
    let tokens = at4[0].tokens_to_highlight();
    assert_eq!(tokens["<=0x30"]["R4"], Color::Red);
    assert!(index
        .occurrences_at_source_line(AnalysisKind::RegisterSpilling, ZERO, 4)
        .is_empty());
}

#[test]
fn test_divergence_highlights() {
    let index = build();
    let record = index.analysis(AnalysisKind::BranchDivergence, ADD).unwrap();
    let occ = &record.occurrences()[0];
    assert_eq!(occ.lines_to_highlight(), vec![BinaryAddress::Machine("0x50".into())]);

    let tokens = occ.tokens_to_highlight();
    assert_eq!(tokens["0x40"]["BRA"], Color::Yellow);
    assert_eq!(tokens["*"]["@P0"], Color::Purple);
    assert_eq!(tokens["*"]["@!P0"], Color::Purple);

    // the wildcard reaches address-less lines too
    let displayed: Vec<Option<BinaryAddress>> = index
        .machine_lines(ADD)
        .iter()
        .map(|l| l.address.clone().map(BinaryAddress::Machine))
        .collect();
    assert_eq!(LineSelector::All.select(&displayed).len(), displayed.len());
}

#[test]
fn test_intermediate_occurrence_view() {
    let index = build();
    let views = AnalysisView::for_kernel(&index, ADD);
    let kinds: Vec<&str> = views.iter().map(|v| v.kind.as_str()).collect();
    assert!(kinds.contains(&"dependency_stall"));

    let record = index.analysis(AnalysisKind::DependencyStall, ADD).unwrap();
    let view = OccurrenceView::new(&index, ADD, &record.occurrences()[0]);
    assert_eq!(view.binary_address.as_deref(), Some("6"));
    assert_eq!(view.synthetic_line, Some(5));
    assert_eq!(view.lines_to_highlight, vec!["5"]);
    assert_eq!(view.tokens_to_highlight[">=5"]["%r4"], Color::Blue);
    assert_eq!(view.tokens_to_highlight["6"]["%r4"], Color::Red);
    // every PTX statement from 5 on, with the exact match merged in at 6
    assert!(!view.highlighted_lines.is_empty());

    let correlation =
        LineCorrelation::for_address(&index, ADD, &BinaryAddress::Intermediate(6));
    assert_eq!(correlation.source_line, Some(5));
    assert_eq!(correlation.intermediate_addresses, vec![6, 7, 8]);
}

#[test]
fn test_unknown_keys_never_panic() {
    let index = build();
    assert_eq!(index.machine_to_source("nope", "0x0"), None);
    assert_eq!(index.intermediate_to_source(ADD, 999), None);
    assert!(index.source_to_intermediate(ADD, 999).is_empty());
    assert!(index.machine_lines("nope").is_empty());
    assert!(index.analysis(AnalysisKind::Fp64Usage, ADD).is_none());
    assert!(AnalysisView::new(&index, AnalysisKind::Fp64Usage, ADD).is_none());
}

#[test]
fn test_build_is_deterministic() {
    let first = ResultIndex::build(&inputs(), 7).unwrap();
    let second = ResultIndex::build(&inputs(), 7).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_missing_source_blob_fails() {
    let mut bad = inputs();
    bad.sources.remove("/home/dev/helpers.cuh");
    let err = ResultIndex::build(&bad, 1).unwrap_err();
    assert!(matches!(err, IndexError::UnresolvedFile { .. }));
}

#[test]
fn test_handle_reload() {
    let handle = IndexHandle::new();
    let first = handle.load(&inputs()).unwrap();

    let mut broken = inputs();
    broken.report_json = "{\"file_renames\": 3}".to_string();
    assert!(matches!(handle.load(&broken), Err(IndexError::MalformedReport(_))));
    assert_eq!(handle.current().unwrap().version(), first.version());

    let mut trimmed = inputs();
    trimmed.report_json = REPORT.replace(
        "\"tensor_core_usage\": {\"_Z3addPiS_S_\": {}}",
        "\"fp64_usage\": {}",
    );
    let second = handle.load(&trimmed).unwrap();
    assert!(second.version() > first.version());
    assert_eq!(handle.current().unwrap().analysis_kinds().len(), 4);
    // readers holding the old snapshot are unaffected
    assert_eq!(first.analysis_kinds().len(), 3);
}
