//! Built-in EHT Pipelines
//!
//! The three M87 2017 imaging pipelines: DIFMAP, eht-imaging and SMILI.
//! Each reads the same release of calibrated visibility files and produces
//! images plus post-processed summary plots.

use std::path::Path;

use once_cell::sync::Lazy;

use super::Pipeline;
use crate::environment::{Arch, Container, Directory, DirectoryKind, OsType, Site};
use crate::workflow::filter::ExclusionRule;
use crate::workflow::model::Stage;
use crate::workflow::resolver::{CaptureKind, FileSetSpec};
use crate::workflow::template::{JobTemplate, OutputRole, Rule, Transformation};
use crate::workflow::wildcards::Params;

/// Observation epochs (day of year) of the April 2017 campaign.
pub const EPOCHS: [&str; 4] = ["095", "096", "100", "101"];

/// File-name prefix shared by every file of the data release.
const RELEASE: &str = "SR1_M87_2017";

const COLORMAP: &str = "afmhot_10us.cmap";

const WORKER_PFN: &str =
    "https://download.pegasus.isi.edu/pegasus/5.1.0dev/pegasus-worker-5.1.0dev-x86_64_rhel_8.tar.gz";

const PYTHONPATH: &str = "/home/eht/.local/lib/python3.8/site-packages";

const CONDA_PATH: &str =
    "/opt/conda/envs/eht-imaging/bin:/opt/conda/condabin:/opt/conda/bin:/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// SMILI counts days from April 1st (day 90).
const DAY_OFFSET: i64 = 90;

/// A named pipeline shipped with the crate.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub description: &'static str,
    pub pipeline: Pipeline,
}

static BUILTINS: Lazy<Vec<Builtin>> = Lazy::new(|| {
    vec![
        Builtin {
            name: "difmap",
            description: "CLEAN imaging with DIFMAP, per uvfits file",
            pipeline: difmap(),
        },
        Builtin {
            name: "eht-imaging",
            description: "RML imaging with eht-imaging, per epoch (lo + hi band)",
            pipeline: eht_imaging(),
        },
        Builtin {
            name: "smili",
            description: "Sparse-modeling imaging with SMILI, per uvfits file",
            pipeline: smili(),
        },
    ]
});

/// All built-in pipelines.
pub fn builtins() -> &'static [Builtin] {
    &BUILTINS
}

/// Looks up a built-in pipeline by name.
pub fn builtin(name: &str) -> Option<&'static Pipeline> {
    BUILTINS
        .iter()
        .find(|b| b.name == name)
        .map(|b| &b.pipeline)
}

fn worker() -> Transformation {
    Transformation::new("worker", "local", WORKER_PFN)
        .with_namespace("pegasus")
        .with_arch(Arch::Aarch64)
}

/// DIFMAP: image every file, post-process the full and the no-residuals
/// image, and summarize the low-band images.
fn difmap() -> Pipeline {
    let transformation = |name: &str, script: &str| {
        Transformation::new(name, "condorpool", script)
            .with_arch(Arch::Aarch64)
            .with_container("difmap")
    };

    let image = "{stem}.{mask_stem}.{suffix}";
    let products = ["fits", "mod", "noresiduals.fits", "par", "stat", "uvf", "win"];

    let imaging = products.iter().fold(
        JobTemplate::new(transformation("difmapp", "difmap.sh"))
            .with_arg("{name}")
            .with_input("{name}")
            .with_input("{mask}")
            .with_input("{eht_difmap}"),
        |template, ext| template.with_output(format!("{}.{}", image, ext)),
    );

    let postprocessing = JobTemplate::new(transformation(
        "difmap-postprocessing",
        "difmap-postprocessing.py",
    ))
    .with_args([
        "-i".to_string(),
        format!("{}{{variant}}.fits", image),
        "-o".to_string(),
        format!("{}{{variant}}.pdf", image),
        "--all".to_string(),
    ])
    .with_input("{colormap}")
    .with_input(format!("{}{{variant}}.fits", image))
    .with_output(format!("{}{{variant}}.pdf", image));

    let imgsum = JobTemplate::new(transformation("difmap-imgsum", "difmap-imgsum.py"))
        .with_args([
            "-i".to_string(),
            format!("{}.noresiduals.fits", image),
            "-o".to_string(),
            "{name}".to_string(),
            "-O".to_string(),
            ".".to_string(),
        ])
        .with_input("{colormap}")
        .with_input(format!("{}.noresiduals.fits", image))
        .with_input("{name}")
        .with_output(format!("{}.noresiduals.img.pdf", image));

    Pipeline::new("eht-difmap", FileSetSpec::new("*.uvfits"))
        .with_auxiliary("EHT_Difmap")
        .with_auxiliary("CircMask_r30_x-0.002_y0.022.win")
        .with_auxiliary(COLORMAP)
        .with_param("eht_difmap", "EHT_Difmap")
        .with_param("mask", "CircMask_r30_x-0.002_y0.022.win")
        .with_param("mask_stem", "CircMask_r30_x-0.002_y0.022")
        .with_param("colormap", COLORMAP)
        .with_param("suffix", "RT-10.CF0.5.ALMA0.1.UVW2_-1")
        .with_container(
            Container::docker("difmap", "docker://globalcomputinglab/reproducibility-eht:difmap")
                .with_env("PYTHONPATH", PYTHONPATH)
                .with_env(
                    "PATH",
                    format!("{}:/usr/local/pgplot:/home/eht/uvf_difmap_2.5k", CONDA_PATH),
                ),
        )
        .with_transformation(worker())
        .with_template(imaging)
        .with_template(postprocessing)
        .with_template(imgsum)
        .with_stage(Stage::new("difmap", "difmapp"))
        .with_stage(Stage::new("postprocessing", "difmap-postprocessing").with_param("variant", ""))
        .with_stage(
            Stage::new("postprocessing_noresiduals", "difmap-postprocessing")
                .with_param("variant", ".noresiduals"),
        )
        .with_stage(Stage::new("imgsum", "difmap-imgsum"))
        .with_exclusion(ExclusionRule::new("imgsum", "stem", "_hi_"))
}

/// eht-imaging: one imaging job per epoch combining both bands.
fn eht_imaging() -> Pipeline {
    let transformation = |name: &str, script: &str| {
        Transformation::new(name, "condorpool", script).with_container("eht-imaging")
    };

    let lo = "{release}_{epoch}_lo_hops_netcal_StokesI.uvfits";
    let hi = "{release}_{epoch}_hi_hops_netcal_StokesI.uvfits";
    let fits = "{release}_{epoch}.fits";

    let imaging = JobTemplate::new(transformation("eht-imaging_pipeline", "eht-imaging_pipeline.py"))
        .with_args(["-i", lo, "-i2", hi, "-o", fits, "--savepdf", "--imgsum"])
        .with_input(lo)
        .with_input(hi)
        .with_output_role(OutputRole::unregistered(fits))
        .with_output_role(OutputRole::unregistered("{release}_{epoch}.pdf"))
        .with_output_role(OutputRole::unregistered("{release}_{epoch}_imgsum.pdf"));

    let processed = "{release}_{epoch}_processed.pdf";
    let postprocessing = JobTemplate::new(transformation(
        "eht-imaging_postprocessing",
        "eht-imaging_postprocessing.py",
    ))
    .with_args(["-i", fits, "-o", processed, "--blur", "--afmhot10us", "--notitle"])
    .with_input(fits)
    .with_input("{colormap}")
    .with_output_role(OutputRole::unregistered(processed));

    let local = Site::new("local")
        .with_platform(Arch::X86_64, OsType::Linux)
        .with_directory(Directory::served(
            DirectoryKind::SharedStorage,
            Path::new("dags/wf-output"),
        ))
        .with_directory(Directory::served(
            DirectoryKind::SharedScratch,
            Path::new("dags/wf-scratch/LOCAL"),
        ));

    let condorpool = Site::new("condorpool")
        .with_platform(Arch::X86_64, OsType::Linux)
        .with_profile("pegasus", "style", "condor");

    Pipeline::new("eht-imaging", FileSetSpec::new("*.uvfits"))
        .with_auxiliary(COLORMAP)
        .with_param("colormap", COLORMAP)
        .with_param("release", RELEASE)
        .with_site(local)
        .with_site(condorpool)
        .with_container(
            Container::docker("eht-imaging", "docker://pegasus/reproducibility-eht:eht-imaging")
                .with_env("PYTHONPATH", PYTHONPATH)
                .with_env("PATH", CONDA_PATH),
        )
        .with_template(imaging)
        .with_template(postprocessing)
        .with_stage(Stage::new("imaging", "eht-imaging_pipeline").per_value("epoch", EPOCHS))
        .with_stage(
            Stage::new("postprocessing", "eht-imaging_postprocessing").per_value("epoch", EPOCHS),
        )
}

/// Day number passed to SMILI, derived from the epoch token of the file name.
fn observation_day(params: &Params) -> std::result::Result<String, String> {
    let epoch = params
        .get("epoch")
        .ok_or_else(|| "missing parameter 'epoch'".to_string())?;
    let day: i64 = epoch
        .parse()
        .map_err(|_| format!("epoch '{}' is not an integer", epoch))?;
    Ok((day - DAY_OFFSET).to_string())
}

/// SMILI: image every file, then post-process the high-band image of each epoch.
fn smili() -> Pipeline {
    let transformation = |name: &str, script: &str| {
        Transformation::new(name, "condorpool", script)
            .with_arch(Arch::Aarch64)
            .with_container("smili")
    };

    let imaging = JobTemplate::new(transformation("smili_imaging_pipeline", "smili_imaging_pipeline.py"))
        .with_args(["-i", "{name}", "--day"])
        .with_arg(Rule::computed(observation_day))
        .with_args(["--nproc", "1"])
        .with_input("{name}")
        .with_output("{stem}.fits")
        .with_output("{stem}.precal.uvfits")
        .with_output("{stem}.selfcal.uvfits");

    let fits = "{release}_{epoch}_hi_hops_netcal_StokesI.fits";
    let processed = "{release}_{epoch}_processed.pdf";
    let postprocessing = JobTemplate::new(transformation("smili_postprocessing", "smili_postprocessing.py"))
        .with_args(["-i", fits, "-o", processed, "--all"])
        .with_input(fits)
        .with_input("{colormap}")
        .with_output(processed);

    let inputs = FileSetSpec::new("*_[0-9][0-9][0-9]_*.uvfits")
        .with_pattern(r".*_(?P<epoch>[0-9]{3})_.*")
        .with_capture("epoch", CaptureKind::Integer);

    Pipeline::new("eht-smili", inputs)
        .with_auxiliary(COLORMAP)
        .with_param("colormap", COLORMAP)
        .with_param("release", RELEASE)
        .with_container(Container::docker("smili", "docker://pegasus/reproducibility-eht:smili").with_env(
            "PATH",
            "/root/.pyenv/versions/anaconda3-5.3.1/bin:/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
        ))
        .with_transformation(worker())
        .with_template(imaging)
        .with_template(postprocessing)
        .with_stage(Stage::new("imaging", "smili_imaging_pipeline"))
        .with_stage(Stage::new("postprocessing", "smili_postprocessing").per_value("epoch", EPOCHS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::pipeline::GenerateOptions;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn release_files() -> Vec<String> {
        EPOCHS
            .iter()
            .flat_map(|d| {
                ["lo", "hi"]
                    .into_iter()
                    .map(move |band| format!("{}_{}_{}_hops_netcal_StokesI.uvfits", RELEASE, d, band))
            })
            .collect()
    }

    fn workspace(files: &[String]) -> (TempDir, GenerateOptions) {
        let root = tempdir().unwrap();
        let uvfits_dir = root.path().join("uvfits");
        let scripts_dir = root.path().join("scripts");
        fs::create_dir(&uvfits_dir).unwrap();
        fs::create_dir(&scripts_dir).unwrap();
        for file in files {
            fs::write(uvfits_dir.join(file), "").unwrap();
        }
        for aux in ["EHT_Difmap", "CircMask_r30_x-0.002_y0.022.win", COLORMAP] {
            fs::write(root.path().join(aux), "").unwrap();
        }

        let options = GenerateOptions {
            uvfits_dir,
            scripts_dir,
            work_dir: root.path().to_path_buf(),
        };
        (root, options)
    }

    #[test]
    fn test_registry() {
        let names: Vec<_> = builtins().iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["difmap", "eht-imaging", "smili"]);
        assert_eq!(builtin("smili").unwrap().name, "eht-smili");
        assert!(builtin("casa").is_none());
    }

    #[test]
    fn test_difmap_graph() {
        let (_root, options) = workspace(&release_files());
        let generated = builtin("difmap").unwrap().generate(&options).unwrap();
        let graph = &generated.graph;

        // 8 imaging + 2 x 8 post-processing + 4 low-band summaries
        assert_eq!(graph.len(), 28);
        assert_eq!(graph.edges.len(), 20);
        assert!(graph
            .instances
            .iter()
            .filter(|i| i.stage == "imgsum")
            .all(|i| !i.params["stem"].contains("_hi_")));

        let stem = "SR1_M87_2017_095_lo_hops_netcal_StokesI";
        let imaging = graph.get_instance(&format!("difmap:{}", stem)).unwrap();
        assert_eq!(imaging.outputs.len(), 7);
        assert_eq!(
            imaging.outputs[0].name.as_str(),
            format!("{}.CircMask_r30_x-0.002_y0.022.RT-10.CF0.5.ALMA0.1.UVW2_-1.fits", stem)
        );

        let post = graph
            .get_instance(&format!("postprocessing_noresiduals:{}", stem))
            .unwrap();
        assert_eq!(graph.parents_of(&post.id), vec![imaging.id.as_str()]);
        assert!(post.arguments[1].ends_with(".noresiduals.fits"));

        assert_eq!(graph.root_instances().len(), 8);
        assert_eq!(graph.leaf_instances().len(), 20);
        assert_eq!(graph.used_templates().len(), 3);

        // Raw files plus the three auxiliary files
        assert_eq!(graph.raw_artifacts().count(), 11);
        assert_eq!(generated.all_transformations().count(), 4);
    }

    #[test]
    fn test_difmap_prefixed_file_names() {
        let files = vec![
            "SR1_M87_2017_095_lo.uvfits".to_string(),
            "noresiduals_SR1_M87_2017_095_lo.uvfits".to_string(),
        ];
        let (_root, options) = workspace(&files);
        let graph = builtin("difmap").unwrap().generate(&options).unwrap().graph;

        assert_eq!(graph.len(), 8);
        assert_eq!(graph.edges.len(), 6);
        assert!(graph
            .get_instance("postprocessing:noresiduals_SR1_M87_2017_095_lo")
            .is_some());
        assert!(graph
            .get_instance("postprocessing_noresiduals:SR1_M87_2017_095_lo")
            .is_some());
    }

    #[test]
    fn test_eht_imaging_graph() {
        let (_root, options) = workspace(&release_files());
        let generated = builtin("eht-imaging").unwrap().generate(&options).unwrap();
        let graph = &generated.graph;

        assert_eq!(graph.len(), 8);
        assert_eq!(graph.edges.len(), 4);
        assert_eq!(graph.parents_of("postprocessing:100"), vec!["imaging:100"]);

        let imaging = graph.get_instance("imaging:095").unwrap();
        assert!(imaging.outputs.iter().all(|o| !o.register_replica));
        assert_eq!(imaging.inputs.len(), 2);

        let local = &generated.sites[0];
        assert!(Path::new(&local.directories[0].path).is_absolute());
        assert!(local.directories[0].path.ends_with("dags/wf-output"));
    }

    #[test]
    fn test_eht_imaging_missing_band() {
        let files: Vec<String> = release_files()
            .into_iter()
            .filter(|f| !f.contains("_101_hi_"))
            .collect();
        let (_root, options) = workspace(&files);

        match builtin("eht-imaging").unwrap().generate(&options) {
            Err(GraphError::UnresolvedDependency { job, artifact }) => {
                assert_eq!(job, "imaging:101");
                assert!(artifact.contains("_101_hi_"));
            }
            other => panic!("Expected UnresolvedDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_smili_graph() {
        let (_root, options) = workspace(&release_files());
        let generated = builtin("smili").unwrap().generate(&options).unwrap();
        let graph = &generated.graph;

        assert_eq!(graph.len(), 12);
        assert_eq!(graph.edges.len(), 4);

        let imaging = graph
            .get_instance("imaging:SR1_M87_2017_101_lo_hops_netcal_StokesI")
            .unwrap();
        assert_eq!(
            imaging.arguments,
            vec![
                "-i",
                "SR1_M87_2017_101_lo_hops_netcal_StokesI.uvfits",
                "--day",
                "11",
                "--nproc",
                "1"
            ]
        );

        assert_eq!(
            graph.parents_of("postprocessing:095"),
            vec!["imaging:SR1_M87_2017_095_hi_hops_netcal_StokesI"]
        );
    }

    #[test]
    fn test_smili_ignores_unrelated_files() {
        let mut files = release_files();
        files.push("calibration_notes.uvfits".to_string());
        let (_root, options) = workspace(&files);

        let generated = builtin("smili").unwrap().generate(&options).unwrap();
        assert_eq!(generated.graph.len(), 12);
    }

    #[test]
    fn test_observation_day() {
        let params = Params::from([("epoch".to_string(), "096".to_string())]);
        assert_eq!(observation_day(&params).unwrap(), "6");
        assert!(observation_day(&Params::new()).is_err());
    }
}
